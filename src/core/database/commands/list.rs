// src/core/database/commands/list.rs

//! List commands.

use super::normalize_range;
use super::undo::undo_first_key;
use crate::core::database::Database;
use crate::core::database::registry::{
    CmdResult, CommandFlags, CommandSpec, prepare_read_first_key, prepare_write_first_key,
};
use crate::core::storage::DataEntity;
use crate::core::{CitrineError, RespValue};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;

pub(super) fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "lpush",
            exec: |db, args| exec_push(db, args, End::Left),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: -3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "rpush",
            exec: |db, args| exec_push(db, args, End::Right),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: -3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "lpop",
            exec: |db, args| exec_pop(db, args, End::Left),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 2,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "rpop",
            exec: |db, args| exec_pop(db, args, End::Right),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 2,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "llen",
            exec: exec_llen,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "lrange",
            exec: exec_lrange,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 4,
            flags: CommandFlags::READONLY,
        },
    ]
}

#[derive(Clone, Copy)]
enum End {
    Left,
    Right,
}

fn exec_push(db: &Arc<Database>, args: &[Bytes], end: End) -> Result<CmdResult, CitrineError> {
    let values = &args[1..];
    let new_len = db.with_entity_or_insert(
        args[0].clone(),
        || DataEntity::List(VecDeque::new()),
        |entity| -> Result<usize, CitrineError> {
            let list = entity.as_list_mut()?;
            for value in values {
                match end {
                    End::Left => list.push_front(value.clone()),
                    End::Right => list.push_back(value.clone()),
                }
            }
            Ok(list.len())
        },
    )?;

    let name = match end {
        End::Left => Bytes::from_static(b"LPUSH"),
        End::Right => Bytes::from_static(b"RPUSH"),
    };
    let mut line = Vec::with_capacity(args.len() + 1);
    line.push(name);
    line.extend(args.iter().cloned());
    Ok(CmdResult::with_aof(
        RespValue::Integer(new_len as i64),
        vec![line],
    ))
}

fn exec_pop(db: &Arc<Database>, args: &[Bytes], end: End) -> Result<CmdResult, CitrineError> {
    let popped = db
        .with_entity_mut(&args[0], |entity| -> Result<_, CitrineError> {
            let list = entity.as_list_mut()?;
            let value = match end {
                End::Left => list.pop_front(),
                End::Right => list.pop_back(),
            };
            Ok((value, list.is_empty()))
        })
        .transpose()?;

    let Some((Some(value), emptied)) = popped else {
        return Ok(CmdResult::reply(RespValue::Null));
    };
    if emptied {
        db.remove_key(&args[0]);
    }

    let name = match end {
        End::Left => Bytes::from_static(b"LPOP"),
        End::Right => Bytes::from_static(b"RPOP"),
    };
    let line = vec![name, args[0].clone()];
    Ok(CmdResult::with_aof(RespValue::BulkString(value), vec![line]))
}

fn exec_llen(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_list().map(|l| l.len())) {
        None => Ok(CmdResult::reply(RespValue::Integer(0))),
        Some(Ok(len)) => Ok(CmdResult::reply(RespValue::Integer(len as i64))),
        Some(Err(e)) => Err(e),
    }
}

fn exec_lrange(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let start = super::parse_i64(&args[1])?;
    let stop = super::parse_i64(&args[2])?;

    let items = db
        .with_entity(&args[0], |entity| -> Result<Vec<RespValue>, CitrineError> {
            let list = entity.as_list()?;
            let Some((from, to)) = normalize_range(start, stop, list.len()) else {
                return Ok(Vec::new());
            };
            Ok(list
                .iter()
                .skip(from)
                .take(to - from + 1)
                .cloned()
                .map(RespValue::BulkString)
                .collect())
        })
        .transpose()?
        .unwrap_or_default();

    Ok(CmdResult::reply(RespValue::Array(items)))
}
