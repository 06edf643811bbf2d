// src/core/database/commands/hash.rs

//! Hash commands.

use super::undo::undo_first_key;
use crate::core::database::Database;
use crate::core::database::registry::{
    CmdResult, CommandFlags, CommandSpec, prepare_read_first_key, prepare_write_first_key,
};
use crate::core::storage::DataEntity;
use crate::core::{CitrineError, RespValue};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

pub(super) fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "hset",
            exec: exec_hset,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: -4,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "hget",
            exec: exec_hget,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 3,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "hdel",
            exec: exec_hdel,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: -3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "hexists",
            exec: exec_hexists,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 3,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "hlen",
            exec: exec_hlen,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "hgetall",
            exec: exec_hgetall,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
    ]
}

fn exec_hset(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    if (args.len() - 1) % 2 != 0 {
        return Err(CitrineError::WrongArgumentCount("hset".into()));
    }
    let pairs = &args[1..];
    let added = db.with_entity_or_insert(
        args[0].clone(),
        || DataEntity::Hash(HashMap::new()),
        |entity| -> Result<i64, CitrineError> {
            let hash = entity.as_hash_mut()?;
            let mut added = 0;
            for pair in pairs.chunks_exact(2) {
                if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
                    added += 1;
                }
            }
            Ok(added)
        },
    )?;

    let mut line = Vec::with_capacity(args.len() + 1);
    line.push(Bytes::from_static(b"HSET"));
    line.extend(args.iter().cloned());
    Ok(CmdResult::with_aof(RespValue::Integer(added), vec![line]))
}

fn exec_hget(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_hash().map(|h| h.get(&args[1]).cloned())) {
        None => Ok(CmdResult::reply(RespValue::Null)),
        Some(Ok(Some(value))) => Ok(CmdResult::reply(RespValue::BulkString(value))),
        Some(Ok(None)) => Ok(CmdResult::reply(RespValue::Null)),
        Some(Err(e)) => Err(e),
    }
}

fn exec_hdel(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let fields = &args[1..];
    let outcome = db
        .with_entity_mut(&args[0], |entity| -> Result<_, CitrineError> {
            let hash = entity.as_hash_mut()?;
            let removed = fields
                .iter()
                .filter(|field| hash.remove(*field).is_some())
                .count();
            Ok((removed, hash.is_empty()))
        })
        .transpose()?;

    let Some((removed, emptied)) = outcome else {
        return Ok(CmdResult::reply(RespValue::Integer(0)));
    };
    if emptied {
        db.remove_key(&args[0]);
    }

    let mut result = CmdResult::reply(RespValue::Integer(removed as i64));
    if removed > 0 {
        let mut line = Vec::with_capacity(args.len() + 1);
        line.push(Bytes::from_static(b"HDEL"));
        line.extend(args.iter().cloned());
        result.aof.push(line);
    }
    Ok(result)
}

fn exec_hexists(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_hash().map(|h| h.contains_key(&args[1]))) {
        None => Ok(CmdResult::reply(RespValue::Integer(0))),
        Some(Ok(present)) => Ok(CmdResult::reply(RespValue::Integer(present as i64))),
        Some(Err(e)) => Err(e),
    }
}

fn exec_hlen(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_hash().map(|h| h.len())) {
        None => Ok(CmdResult::reply(RespValue::Integer(0))),
        Some(Ok(len)) => Ok(CmdResult::reply(RespValue::Integer(len as i64))),
        Some(Err(e)) => Err(e),
    }
}

fn exec_hgetall(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let flat = db
        .with_entity(&args[0], |entity| -> Result<Vec<RespValue>, CitrineError> {
            let hash = entity.as_hash()?;
            let mut flat = Vec::with_capacity(hash.len() * 2);
            for (field, value) in hash {
                flat.push(RespValue::BulkString(field.clone()));
                flat.push(RespValue::BulkString(value.clone()));
            }
            Ok(flat)
        })
        .transpose()?
        .unwrap_or_default();
    Ok(CmdResult::reply(RespValue::Array(flat)))
}
