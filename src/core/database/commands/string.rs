// src/core/database/commands/string.rs

//! String commands.

use super::undo::{undo_first_key, undo_interleaved_keys};
use super::{lowercase, parse_i64, pexpireat_cmd};
use crate::core::database::Database;
use crate::core::database::registry::{
    CmdResult, CommandFlags, CommandSpec, prepare_read_first_key, prepare_write_first_key,
};
use crate::core::storage::DataEntity;
use crate::core::{CitrineError, RespValue};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub(super) fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "get",
            exec: exec_get,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "set",
            exec: exec_set,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: -3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "setnx",
            exec: exec_setnx,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "setex",
            exec: exec_setex,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 4,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "getset",
            exec: exec_getset,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "strlen",
            exec: exec_strlen,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "append",
            exec: exec_append,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "incr",
            exec: |db, args| exec_incr_by(db, args, 1),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 2,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "decr",
            exec: |db, args| exec_incr_by(db, args, -1),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 2,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "incrby",
            exec: exec_incrby,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "decrby",
            exec: exec_decrby,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "mget",
            exec: exec_mget,
            prepare: |args| (vec![], args.to_vec()),
            undo: None,
            arity: -2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "mset",
            exec: exec_mset,
            prepare: |args| (args.iter().step_by(2).cloned().collect(), vec![]),
            undo: Some(undo_interleaved_keys),
            arity: -3,
            flags: CommandFlags::WRITE,
        },
    ]
}

fn exec_get(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_str().cloned()) {
        None => Ok(CmdResult::reply(RespValue::Null)),
        Some(Ok(value)) => Ok(CmdResult::reply(RespValue::BulkString(value))),
        Some(Err(e)) => Err(e),
    }
}

/// The TTL option parsed from SET's trailing arguments.
#[derive(Default, Clone, Copy, PartialEq)]
enum SetTtl {
    #[default]
    None,
    Seconds(i64),
    Milliseconds(i64),
}

/// The existence condition parsed from SET's trailing arguments.
#[derive(Default, Clone, Copy, PartialEq)]
enum SetCondition {
    #[default]
    Any,
    IfAbsent,
    IfExists,
}

fn exec_set(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let key = args[0].clone();
    let value = args[1].clone();

    let mut ttl = SetTtl::None;
    let mut condition = SetCondition::Any;
    let mut rest = args[2..].iter();
    while let Some(opt) = rest.next() {
        match lowercase(opt).as_str() {
            "nx" if condition == SetCondition::Any => condition = SetCondition::IfAbsent,
            "xx" if condition == SetCondition::Any => condition = SetCondition::IfExists,
            "ex" if ttl == SetTtl::None => {
                let secs = parse_i64(rest.next().ok_or(CitrineError::SyntaxError)?)?;
                if secs <= 0 {
                    return Err(CitrineError::InvalidState(
                        "invalid expire time in 'set' command".into(),
                    ));
                }
                ttl = SetTtl::Seconds(secs);
            }
            "px" if ttl == SetTtl::None => {
                let ms = parse_i64(rest.next().ok_or(CitrineError::SyntaxError)?)?;
                if ms <= 0 {
                    return Err(CitrineError::InvalidState(
                        "invalid expire time in 'set' command".into(),
                    ));
                }
                ttl = SetTtl::Milliseconds(ms);
            }
            _ => return Err(CitrineError::SyntaxError),
        }
    }

    let stored = match condition {
        SetCondition::Any => {
            db.put_entity(key.clone(), DataEntity::Str(value.clone()));
            true
        }
        SetCondition::IfAbsent => {
            db.put_if_absent(key.clone(), DataEntity::Str(value.clone())) == 1
        }
        SetCondition::IfExists => db.put_if_exists(key.clone(), DataEntity::Str(value.clone())) == 1,
    };

    if !stored {
        return Ok(CmdResult::reply(RespValue::Null));
    }

    let mut aof = vec![vec![Bytes::from_static(b"SET"), key.clone(), value]];
    match ttl {
        SetTtl::None => {
            // A plain SET discards any previous TTL.
            db.persist(&key);
        }
        SetTtl::Seconds(secs) => {
            let at = SystemTime::now() + Duration::from_secs(secs as u64);
            db.expire_at(key.clone(), at);
            aof.push(pexpireat_cmd(&key, at));
        }
        SetTtl::Milliseconds(ms) => {
            let at = SystemTime::now() + Duration::from_millis(ms as u64);
            db.expire_at(key.clone(), at);
            aof.push(pexpireat_cmd(&key, at));
        }
    }

    Ok(CmdResult::with_aof(RespValue::ok(), aof))
}

fn exec_setnx(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let inserted = db.put_if_absent(args[0].clone(), DataEntity::Str(args[1].clone()));
    let mut result = CmdResult::reply(RespValue::Integer(inserted as i64));
    if inserted == 1 {
        result.aof.push(vec![
            Bytes::from_static(b"SET"),
            args[0].clone(),
            args[1].clone(),
        ]);
    }
    Ok(result)
}

fn exec_setex(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let secs = parse_i64(&args[1])?;
    if secs <= 0 {
        return Err(CitrineError::InvalidState(
            "invalid expire time in 'setex' command".into(),
        ));
    }
    let key = args[0].clone();
    let value = args[2].clone();
    db.put_entity(key.clone(), DataEntity::Str(value.clone()));
    let at = SystemTime::now() + Duration::from_secs(secs as u64);
    db.expire_at(key.clone(), at);

    let aof = vec![
        vec![Bytes::from_static(b"SET"), key.clone(), value],
        pexpireat_cmd(&key, at),
    ];
    Ok(CmdResult::with_aof(RespValue::ok(), aof))
}

fn exec_getset(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let old = match db.get_entity(&args[0]) {
        None => RespValue::Null,
        Some(entity) => RespValue::BulkString(entity.as_str()?.clone()),
    };
    db.put_entity(args[0].clone(), DataEntity::Str(args[1].clone()));
    db.persist(&args[0]);
    let aof = vec![vec![
        Bytes::from_static(b"SET"),
        args[0].clone(),
        args[1].clone(),
    ]];
    Ok(CmdResult::with_aof(old, aof))
}

fn exec_strlen(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_str().map(|b| b.len())) {
        None => Ok(CmdResult::reply(RespValue::Integer(0))),
        Some(Ok(len)) => Ok(CmdResult::reply(RespValue::Integer(len as i64))),
        Some(Err(e)) => Err(e),
    }
}

fn exec_append(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let suffix = args[1].clone();
    let new_len = db.with_entity_or_insert(
        args[0].clone(),
        || DataEntity::Str(Bytes::new()),
        |entity| match entity {
            DataEntity::Str(current) => {
                let mut combined = Vec::with_capacity(current.len() + suffix.len());
                combined.extend_from_slice(current);
                combined.extend_from_slice(&suffix);
                *current = Bytes::from(combined);
                Ok(current.len())
            }
            _ => Err(CitrineError::WrongType),
        },
    )?;

    let aof = vec![vec![
        Bytes::from_static(b"APPEND"),
        args[0].clone(),
        args[1].clone(),
    ]];
    Ok(CmdResult::with_aof(RespValue::Integer(new_len as i64), aof))
}

fn exec_incrby(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let delta = parse_i64(&args[1])?;
    exec_incr_by(db, args, delta)
}

fn exec_decrby(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let delta = parse_i64(&args[1])?;
    exec_incr_by(db, args, delta.checked_neg().ok_or(CitrineError::Overflow)?)
}

fn exec_incr_by(db: &Arc<Database>, args: &[Bytes], delta: i64) -> Result<CmdResult, CitrineError> {
    let new_value = db.with_entity_or_insert(
        args[0].clone(),
        || DataEntity::Str(Bytes::from_static(b"0")),
        |entity| -> Result<i64, CitrineError> {
            let current = entity.as_str()?;
            let parsed = std::str::from_utf8(current)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(CitrineError::NotAnInteger)?;
            let next = parsed.checked_add(delta).ok_or(CitrineError::Overflow)?;
            *entity = DataEntity::Str(Bytes::from(next.to_string()));
            Ok(next)
        },
    )?;

    let mut line = vec![Bytes::from_static(b"SET"), args[0].clone()];
    line.push(Bytes::from(new_value.to_string()));
    Ok(CmdResult::with_aof(RespValue::Integer(new_value), vec![line]))
}

fn exec_mget(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let values = args
        .iter()
        .map(|key| match db.with_entity(key, |e| e.as_str().cloned()) {
            Some(Ok(value)) => RespValue::BulkString(value),
            // Missing keys and wrong-typed values both read as nil.
            _ => RespValue::Null,
        })
        .collect();
    Ok(CmdResult::reply(RespValue::Array(values)))
}

fn exec_mset(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    if args.len() % 2 != 0 {
        return Err(CitrineError::WrongArgumentCount("mset".into()));
    }
    for pair in args.chunks_exact(2) {
        db.put_entity(pair[0].clone(), DataEntity::Str(pair[1].clone()));
        db.persist(&pair[0]);
    }
    let mut line = Vec::with_capacity(args.len() + 1);
    line.push(Bytes::from_static(b"MSET"));
    line.extend(args.iter().cloned());
    Ok(CmdResult::with_aof(RespValue::ok(), vec![line]))
}
