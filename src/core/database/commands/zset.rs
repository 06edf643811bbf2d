// src/core/database/commands/zset.rs

//! Sorted set commands.

use super::undo::undo_first_key;
use super::{lowercase, normalize_range, parse_f64, parse_i64};
use crate::core::database::Database;
use crate::core::database::registry::{
    CmdResult, CommandFlags, CommandSpec, prepare_read_first_key, prepare_write_first_key,
};
use crate::core::storage::DataEntity;
use crate::core::storage::entity::format_score;
use crate::core::storage::zset::{Element, ScoreBorder, SortedSet};
use crate::core::{CitrineError, RespValue};
use bytes::Bytes;
use std::sync::Arc;

pub(super) fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "zadd",
            exec: exec_zadd,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: -4,
            flags: CommandFlags::WRITE,
        },
        CommandSpec {
            name: "zscore",
            exec: exec_zscore,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 3,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "zcard",
            exec: exec_zcard,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 2,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "zrank",
            exec: exec_zrank,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 3,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "zrange",
            exec: exec_zrange,
            prepare: prepare_read_first_key,
            undo: None,
            arity: -4,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "zrangebyscore",
            exec: exec_zrangebyscore,
            prepare: prepare_read_first_key,
            undo: None,
            arity: -4,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "zcount",
            exec: exec_zcount,
            prepare: prepare_read_first_key,
            undo: None,
            arity: 4,
            flags: CommandFlags::READONLY,
        },
        CommandSpec {
            name: "zrem",
            exec: exec_zrem,
            prepare: prepare_write_first_key,
            undo: Some(undo_first_key),
            arity: -3,
            flags: CommandFlags::WRITE,
        },
    ]
}

fn exec_zadd(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    if (args.len() - 1) % 2 != 0 {
        return Err(CitrineError::SyntaxError);
    }
    // Parse every score before mutating anything, so a bad pair cannot leave
    // a half-applied command.
    let mut pairs = Vec::with_capacity((args.len() - 1) / 2);
    for pair in args[1..].chunks_exact(2) {
        pairs.push((parse_f64(&pair[0])?, pair[1].clone()));
    }

    let added = db.with_entity_or_insert(
        args[0].clone(),
        || DataEntity::ZSet(SortedSet::new()),
        |entity| -> Result<usize, CitrineError> {
            let zset = entity.as_zset_mut()?;
            Ok(pairs
                .drain(..)
                .filter(|(score, member)| zset.add(member.clone(), *score))
                .count())
        },
    )?;

    let mut line = Vec::with_capacity(args.len() + 1);
    line.push(Bytes::from_static(b"ZADD"));
    line.extend(args.iter().cloned());
    Ok(CmdResult::with_aof(
        RespValue::Integer(added as i64),
        vec![line],
    ))
}

fn exec_zscore(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_zset().map(|z| z.score(&args[1]))) {
        None => Ok(CmdResult::reply(RespValue::Null)),
        Some(Ok(Some(score))) => Ok(CmdResult::reply(RespValue::BulkString(Bytes::from(
            format_score(score),
        )))),
        Some(Ok(None)) => Ok(CmdResult::reply(RespValue::Null)),
        Some(Err(e)) => Err(e),
    }
}

fn exec_zcard(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_zset().map(|z| z.len())) {
        None => Ok(CmdResult::reply(RespValue::Integer(0))),
        Some(Ok(len)) => Ok(CmdResult::reply(RespValue::Integer(len as i64))),
        Some(Err(e)) => Err(e),
    }
}

fn exec_zrank(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    match db.with_entity(&args[0], |e| e.as_zset().map(|z| z.rank(&args[1]))) {
        None => Ok(CmdResult::reply(RespValue::Null)),
        Some(Ok(Some(rank))) => Ok(CmdResult::reply(RespValue::Integer(rank as i64))),
        Some(Ok(None)) => Ok(CmdResult::reply(RespValue::Null)),
        Some(Err(e)) => Err(e),
    }
}

/// Renders elements as a flat reply, with scores interleaved when requested.
fn elements_reply(elements: Vec<Element>, with_scores: bool) -> RespValue {
    let mut out = Vec::with_capacity(elements.len() * if with_scores { 2 } else { 1 });
    for element in elements {
        out.push(RespValue::BulkString(element.member));
        if with_scores {
            out.push(RespValue::BulkString(Bytes::from(format_score(
                element.score,
            ))));
        }
    }
    RespValue::Array(out)
}

fn exec_zrange(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let start = parse_i64(&args[1])?;
    let stop = parse_i64(&args[2])?;
    let with_scores = match args.get(3) {
        None => false,
        Some(opt) if lowercase(opt) == "withscores" => true,
        Some(_) => return Err(CitrineError::SyntaxError),
    };
    if args.len() > 4 {
        return Err(CitrineError::SyntaxError);
    }

    let elements = db
        .with_entity(&args[0], |entity| -> Result<Vec<Element>, CitrineError> {
            let zset = entity.as_zset()?;
            let Some((from, to)) = normalize_range(start, stop, zset.len()) else {
                return Ok(Vec::new());
            };
            Ok(zset.range_by_rank(from as u64, to as u64 + 1))
        })
        .transpose()?
        .unwrap_or_default();

    Ok(CmdResult::reply(elements_reply(elements, with_scores)))
}

fn exec_zrangebyscore(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let min = ScoreBorder::parse(&args[1])?;
    let max = ScoreBorder::parse(&args[2])?;

    let mut with_scores = false;
    let mut offset = 0usize;
    let mut limit = None;
    let mut rest = args[3..].iter();
    while let Some(opt) = rest.next() {
        match lowercase(opt).as_str() {
            "withscores" => with_scores = true,
            "limit" => {
                let raw_offset = parse_i64(rest.next().ok_or(CitrineError::SyntaxError)?)?;
                let raw_count = parse_i64(rest.next().ok_or(CitrineError::SyntaxError)?)?;
                offset = raw_offset.max(0) as usize;
                // A negative count means "everything after the offset".
                limit = (raw_count >= 0).then_some(raw_count as usize);
            }
            _ => return Err(CitrineError::SyntaxError),
        }
    }

    let elements = db
        .with_entity(&args[0], |entity| -> Result<Vec<Element>, CitrineError> {
            Ok(entity.as_zset()?.range_by_score(&min, &max, offset, limit))
        })
        .transpose()?
        .unwrap_or_default();

    Ok(CmdResult::reply(elements_reply(elements, with_scores)))
}

fn exec_zcount(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let min = ScoreBorder::parse(&args[1])?;
    let max = ScoreBorder::parse(&args[2])?;
    match db.with_entity(&args[0], |e| e.as_zset().map(|z| z.count(&min, &max))) {
        None => Ok(CmdResult::reply(RespValue::Integer(0))),
        Some(Ok(count)) => Ok(CmdResult::reply(RespValue::Integer(count as i64))),
        Some(Err(e)) => Err(e),
    }
}

fn exec_zrem(db: &Arc<Database>, args: &[Bytes]) -> Result<CmdResult, CitrineError> {
    let members = &args[1..];
    let outcome = db
        .with_entity_mut(&args[0], |entity| -> Result<_, CitrineError> {
            let zset = entity.as_zset_mut()?;
            let removed = members.iter().filter(|member| zset.remove(member)).count();
            Ok((removed, zset.is_empty()))
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
        line.push(Bytes::from_static(b"ZREM"));
        line.extend(args.iter().cloned());
        result.aof.push(line);
    }
    Ok(result)
}
