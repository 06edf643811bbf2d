// src/core/database/commands/generic.rs

//! Generic key-space commands: existence, expiration, enumeration.

use super::undo::{undo_all_keys, undo_first_key};
use super::{from_unix_millis, glob_match, parse_i64, pexpireat_cmd, unix_millis};
use crate::core::database::Database;
use crate::core::database::registry::{
    CmdResult, CommandFlags, CommandSpec, prepare_no_keys, prepare_read_all_keys,
    prepare_read_first_key, prepare_write_all_keys, prepare_write_first_key,
};
use crate::core::{CitrineError, RespValue};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub(super) fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "del",
            exec: exec_del,
            prepare: prepare_write_all_keys,
            undo: Some(undo_all_keys),
            arity: -2,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "exists",
            exec: exec_exists,
            prepare: prepare_read_all_keys,
            undo: None,
            arity: -2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "expire",
            exec: |db, args| exec_expire_generic(db, args, TtlUnit::Seconds, TtlBase::Relative),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "expireat",
            exec: |db, args| exec_expire_generic(db, args, TtlUnit::Seconds, TtlBase::Absolute),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "pexpire",
            exec: |db, args| exec_expire_generic(db, args, TtlUnit::Millis, TtlBase::Relative),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "pexpireat",
            exec: |db, args| exec_expire_generic(db, args, TtlUnit::Millis, TtlBase::Absolute),
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 3,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "persist",
            exec: exec_persist,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: 2,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "ttl",
            exec: |db, args| exec_ttl_generic(db, args, TtlUnit::Seconds),
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "pttl",
            exec: |db, args| exec_ttl_generic(db, args, TtlUnit::Millis),
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "type",
            exec: exec_type,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "keys",
            exec: exec_keys,
            prepare: prepare_no_keys,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "randomkey",
            exec: exec_randomkey,
            prepare: prepare_no_keys,
            undo: None,
            arity: 1,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "flushdb",
            exec: exec_flushdb,
            prepare: prepare_no_keys,
            undo: None,
            arity: 1,
            flags: CommandFlags::WRITE,
        },
    ]
}

fn exec_del(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let mut removed = 0i64;
    for key in args {
        if db.remove_key(key) {
            removed += 1;
        }
    }
    let mut result = CmdResult::reply(RespValue::Integer(removed));
    if removed > 0 {
        let mut line = Vec::with_capacity(args.len() + 1);
        line.push(Bytes::from_static(b"DEL"));
        line.extend(args.iter().cloned());
        result.aof.push(line);
    }
    Ok(result)
}

fn exec_exists(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let count = args.iter().filter(|key| db.exists(key)).count();
    Ok(CmdResult::reply(RespValue::Integer(count as i64)))
}

enum TtlUnit {
    Seconds,
    Millis,
}

enum TtlBase {
    Relative,
    Absolute,
}

/// Shared body of the EXPIRE family. The AOF always records the normalized
/// `PEXPIREAT` form so replay is wall-clock safe; expirations already in the
/// past degenerate to a delete, exactly as replay would observe.
fn exec_expire_generic(
    db: &Arc<Database>,
    args: &[Bytes],
    unit: TtlUnit,
    base: TtlBase,
) -> Result<CmdResult, CitrineError> {
    let raw = parse_i64(&args[1])?;
    if !db.exists(&args[0]) {
        return Ok(CmdResult::reply(RespValue::Integer(0)));
    }

    let millis = match unit {
        TtlUnit::Seconds => raw.saturating_mul(1000),
        TtlUnit::Millis => raw,
    };
    let at = match base {
        TtlBase::Relative => {
            if millis <= 0 {
                SystemTime::UNIX_EPOCH
            } else {
                SystemTime::now() + Duration::from_millis(millis as u64)
            }
        }
        TtlBase::Absolute => from_unix_millis(millis),
    };

    if at <= SystemTime::now() {
        // An expiration in the past deletes the key outright.
        db.remove_key(&args[0]);
        let line = vec![Bytes::from_static(b"DEL"), args[0].clone()];
        return Ok(CmdResult::with_aof(RespValue::Integer(1), vec![line]));
    }

    db.expire_at(args[0].clone(), at);
    Ok(CmdResult::with_aof(
        RespValue::Integer(1),
        vec![pexpireat_cmd(&args[0], at)],
    ))
}

fn exec_persist(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    if !db.exists(&args[0]) {
        return Ok(CmdResult::reply(RespValue::Integer(0)));
    }
    let had_ttl = db.persist(&args[0]);
    let mut result = CmdResult::reply(RespValue::Integer(had_ttl as i64));
    if had_ttl {
        result
            .aof
            .push(vec![Bytes::from_static(b"PERSIST"), args[0].clone()]);
    }
    Ok(result)
}

fn exec_ttl_generic(
    db: &Arc<Database>,
    args: &[Bytes],
    unit: TtlUnit,
) -> Result<CmdResult, CitrineError> {
    if !db.exists(&args[0]) {
        return Ok(CmdResult::reply(RespValue::Integer(-2)));
    }
    let Some(at) = db.expiration(&args[0]) else {
        return Ok(CmdResult::reply(RespValue::Integer(-1)));
    };
    let remaining_ms = unix_millis(at) - unix_millis(SystemTime::now());
    let value = match unit {
        TtlUnit::Seconds => (remaining_ms + 500) / 1000,
        TtlUnit::Millis => remaining_ms,
    };
    Ok(CmdResult::reply(RespValue::Integer(value.max(0))))
}

fn exec_type(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let name = db
        .with_entity(&args[0], |e| e.type_name())
        .unwrap_or("none");
    Ok(CmdResult::reply(RespValue::SimpleString(name.to_string())))
}

fn exec_keys(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let pattern = args[0].clone();
    let mut keys = Vec::new();
    db.for_each(|key, _, _| {
        if glob_match(&pattern, key) {
            keys.push(RespValue::BulkString(key.clone()));
        }
        true
    });
    Ok(CmdResult::reply(RespValue::Array(keys)))
}

fn exec_randomkey(db: &Arc<Database>, _args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    for key in db.random_keys(1) {
        if db.exists(&key) {
            return Ok(CmdResult::reply(RespValue::BulkString(key)));
        }
    }
    Ok(CmdResult::reply(RespValue::Null))
}

fn exec_flushdb(db: &Arc<Database>, _args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    db.flush();
    Ok(CmdResult::with_aof(
        RespValue::ok(),
        vec![vec![Bytes::from_static(b"FLUSHDB")]],
    ))
}
