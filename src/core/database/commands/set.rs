// src/core/database/commands/set.rs

//! Set commands.

use super::undo::undo_first_key;
use crate::core::database::Database;
use crate::core::database::registry::{
    CmdResult, CommandFlags, CommandSpec, prepare_read_first_key, prepare_write_first_key,
};
use crate::core::storage::DataEntity;
use crate::core::{CitrineError, RespValue};
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;

pub(super) fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "sadd",
            exec: exec_sadd,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: -3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "srem",
            exec: exec_srem,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: -3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "scard",
            exec: exec_scard,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "sismember",
            exec: exec_sismember,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 3,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "smembers",
            exec: exec_smembers,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
    ]
}

fn exec_sadd(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let members = &args[1..];
    let added = db.with_entity_or_insert(
        args[0].clone(),
        || DataEntity::Set(HashSet::new()),
        |entity| -> Result<usize, CitrineError> {
            let set = entity.as_set_mut()?;
            Ok(members
                .iter()
                .filter(|member| set.insert((*member).clone()))
                .count())
        },
    )?;

    let mut line = Vec::with_capacity(args.len() + 1);
    line.push(Bytes::from_static(b"SADD"));
    line.extend(args.iter().cloned());
    Ok(CmdResult::with_aof(
        RespValue::Integer(added as i64),
        vec![line],
    ))
}

fn exec_srem(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let members = &args[1..];
    let outcome = db
        .with_entity_mut(&args[0], |entity| -> Result<_, CitrineError> {
            let set = entity.as_set_mut()?;
            let removed = members.iter().filter(|member| set.remove(*member)).count();
            Ok((removed, set.is_empty()))
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
        line.push(Bytes::from_static(b"SREM"));
        line.extend(args.iter().cloned());
        result.aof.push(line);
    }
    Ok(result)
}

fn exec_scard(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_set().map(|s| s.len())) {
        None => Ok(CmdResult::reply(RespValue::Integer(0))),
        Some(Ok(len)) => Ok(CmdResult::reply(RespValue::Integer(len as i64))),
        Some(Err(e)) => Err(e),
    }
}

fn exec_sismember(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_set().map(|s| s.contains(&args[1]))) {
        None => Ok(CmdResult::reply(RespValue::Integer(0))),
        Some(Ok(member)) => Ok(CmdResult::reply(RespValue::Integer(member as i64))),
        Some(Err(e)) => Err(e),
    }
}

fn exec_smembers(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let members = db
        .with_entity(&args[0], |entity| -> Result<Vec<RespValue>, CitrineError> {
            let set = entity.as_set()?;
            Ok(set
                .iter()
                .cloned()
                .map(RespValue::BulkString)
                .collect())
        })
        .transpose()?
        .unwrap_or_default();
    Ok(CmdResult::reply(RespValue::Array(members)))
}
