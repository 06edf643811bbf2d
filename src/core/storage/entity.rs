// src/core/storage/entity.rs

//! The type-tagged value bound to a key.

use crate::core::CitrineError;
use crate::core::storage::zset::SortedSet;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};

/// A `DataEntity` is the opaque value wrapper stored in the keyspace: one of
/// the five supported value kinds. Identity is by key within its database.
#[derive(Debug, Clone)]
pub enum DataEntity {
    Str(Bytes),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
    ZSet(SortedSet),
}

impl DataEntity {
    /// The type name as reported by the `TYPE` command.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataEntity::Str(_) => "string",
            DataEntity::List(_) => "list",
            DataEntity::Hash(_) => "hash",
            DataEntity::Set(_) => "set",
            DataEntity::ZSet(_) => "zset",
        }
    }

    pub fn as_str(&self) -> Result<&Bytes, CitrineError> {
        match self {
            DataEntity::Str(b) => Ok(b),
            _ => Err(CitrineError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, CitrineError> {
        match self {
            DataEntity::List(l) => Ok(l),
            _ => Err(CitrineError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, CitrineError> {
        match self {
            DataEntity::List(l) => Ok(l),
            _ => Err(CitrineError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<Bytes, Bytes>, CitrineError> {
        match self {
            DataEntity::Hash(h) => Ok(h),
            _ => Err(CitrineError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<Bytes, Bytes>, CitrineError> {
        match self {
            DataEntity::Hash(h) => Ok(h),
            _ => Err(CitrineError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&HashSet<Bytes>, CitrineError> {
        match self {
            DataEntity::Set(s) => Ok(s),
            _ => Err(CitrineError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut HashSet<Bytes>, CitrineError> {
        match self {
            DataEntity::Set(s) => Ok(s),
            _ => Err(CitrineError::WrongType),
        }
    }

    pub fn as_zset(&self) -> Result<&SortedSet, CitrineError> {
        match self {
            DataEntity::ZSet(z) => Ok(z),
            _ => Err(CitrineError::WrongType),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut SortedSet, CitrineError> {
        match self {
            DataEntity::ZSet(z) => Ok(z),
            _ => Err(CitrineError::WrongType),
        }
    }

    /// Produces the single command line that would recreate this entity under
    /// `key` on an empty keyspace. Used by the AOF rewrite and by undo logs.
    pub fn to_rebuild_cmd(&self, key: &Bytes) -> Vec<Bytes> {
        match self {
            DataEntity::Str(value) => {
                vec![Bytes::from_static(b"SET"), key.clone(), value.clone()]
            }
            DataEntity::List(items) => {
                let mut line = Vec::with_capacity(items.len() + 2);
                line.push(Bytes::from_static(b"RPUSH"));
                line.push(key.clone());
                line.extend(items.iter().cloned());
                line
            }
            DataEntity::Hash(fields) => {
                let mut line = Vec::with_capacity(fields.len() * 2 + 2);
                line.push(Bytes::from_static(b"HSET"));
                line.push(key.clone());
                for (field, value) in fields {
                    line.push(field.clone());
                    line.push(value.clone());
                }
                line
            }
            DataEntity::Set(members) => {
                let mut line = Vec::with_capacity(members.len() + 2);
                line.push(Bytes::from_static(b"SADD"));
                line.push(key.clone());
                line.extend(members.iter().cloned());
                line
            }
            DataEntity::ZSet(zset) => {
                let mut line = Vec::with_capacity(zset.len() * 2 + 2);
                line.push(Bytes::from_static(b"ZADD"));
                line.push(key.clone());
                for element in zset.elements() {
                    line.push(Bytes::from(format_score(element.score)));
                    line.push(element.member.clone());
                }
                line
            }
        }
    }
}

/// Formats a score the way Redis prints floats: integral values lose the
/// fractional part, everything else uses the shortest roundtrip form.
pub fn format_score(score: f64) -> String {
    if score.is_finite() && score == score.trunc() && score.abs() < 1e17 {
        let mut buf = itoa::Buffer::new();
        buf.format(score as i64).to_string()
    } else {
        let mut buf = ryu::Buffer::new();
        buf.format(score).to_string()
    }
}
