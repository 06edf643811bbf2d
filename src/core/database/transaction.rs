// src/core/database/transaction.rs

//! MULTI/EXEC/WATCH transaction handling: command queueing, optimistic
//! version checks, and atomic execution under a single lock acquisition.

use crate::connection::session::Session;
use crate::core::database::engine::Engine;
use crate::core::database::registry;
use crate::core::{CitrineError, CmdLine, RespValue};
use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

/// Handles `MULTI`: begins queueing. Nesting is rejected.
pub fn start_multi(session: &mut Session) -> Result<RespValue, CitrineError> {
    if session.in_multi {
        return Err(CitrineError::InvalidState(
            "MULTI calls can not be nested".into(),
        ));
    }
    session.in_multi = true;
    session.queued.clear();
    session.tx_errors.clear();
    Ok(RespValue::ok())
}

/// Handles `DISCARD`: throws the queued commands away and unwatches.
pub fn discard(session: &mut Session) -> Result<RespValue, CitrineError> {
    if !session.in_multi {
        return Err(CitrineError::InvalidState("DISCARD without MULTI".into()));
    }
    session.reset_transaction();
    Ok(RespValue::ok())
}

/// Handles `WATCH`: records the current version of each key as the
/// optimistic-concurrency token `EXEC` will compare against.
pub fn watch(
    engine: &Arc<Engine>,
    session: &mut Session,
    keys: &[Bytes],
) -> Result<RespValue, CitrineError> {
    if session.in_multi {
        return Err(CitrineError::InvalidState(
            "WATCH inside MULTI is not allowed".into(),
        ));
    }
    if keys.is_empty() {
        return Err(CitrineError::WrongArgumentCount("watch".into()));
    }
    let db = engine.db_at(session.db_index)?;
    for key in keys {
        session.watching.insert(key.clone(), db.get_version(key));
    }
    Ok(RespValue::ok())
}

/// Handles `UNWATCH`.
pub fn unwatch(session: &mut Session) -> Result<RespValue, CitrineError> {
    session.watching.clear();
    Ok(RespValue::ok())
}

/// Queues one command line while in MULTI. Syntax problems (unknown command,
/// bad arity) are recorded on the session and reported immediately; the
/// transaction is doomed to EXECABORT but keeps accepting commands.
pub fn enqueue(session: &mut Session, line: &[Bytes]) -> RespValue {
    let name = String::from_utf8_lossy(&line[0]).to_lowercase();
    let syntax_check = registry::lookup(&name)
        .ok_or(CitrineError::UnknownCommand(name.clone()))
        .and_then(|spec| {
            if registry::validate_arity(spec.arity, line.len()) {
                Ok(spec)
            } else {
                Err(CitrineError::WrongArgumentCount(name.clone()))
            }
        });

    match syntax_check {
        Ok(_) => {
            session.queued.push(line.to_vec());
            RespValue::SimpleString("QUEUED".into())
        }
        Err(e) => {
            session.tx_errors.push(e.to_string());
            RespValue::Error(e.to_string())
        }
    }
}

/// Handles `EXEC`.
pub async fn exec_multi(
    engine: &Arc<Engine>,
    session: &mut Session,
) -> Result<RespValue, CitrineError> {
    if !session.in_multi {
        return Err(CitrineError::InvalidState("EXEC without MULTI".into()));
    }
    let queued = std::mem::take(&mut session.queued);
    let watching = std::mem::take(&mut session.watching);
    let had_errors = !session.tx_errors.is_empty();
    session.reset_transaction();

    if had_errors {
        return Err(CitrineError::ExecAborted);
    }

    let db = engine.db_at(session.db_index)?;

    // Collect the union of keys across the queue so all locks are taken
    // once. Watched keys join the read set: the version check must happen
    // under their locks, or two racing EXECs could both pass it.
    let mut write_keys = Vec::new();
    let mut read_keys: Vec<Bytes> = watching.keys().cloned().collect();
    for line in &queued {
        let name = String::from_utf8_lossy(&line[0]).to_lowercase();
        if let Some(spec) = registry::lookup(&name) {
            let (w, r) = (spec.prepare)(&line[1..]);
            write_keys.extend(w);
            read_keys.extend(r);
        }
    }
    let write_set: BTreeSet<Bytes> = write_keys.into_iter().collect();
    let write_keys: Vec<Bytes> = write_set.into_iter().collect();

    let mut replies = Vec::with_capacity(queued.len());
    let mut aof_payloads: Vec<CmdLine> = Vec::new();
    let mut undo_logs: Vec<Vec<CmdLine>> = Vec::with_capacity(queued.len());

    {
        let _guard = db.locker.lock_rw(&write_keys, &read_keys).await;

        // Optimistic check: any watched key whose version moved since WATCH
        // aborts the transaction with a null multi-bulk.
        for (key, version) in &watching {
            if db.get_version(key) != *version {
                return Ok(RespValue::NullArray);
            }
        }

        // Written keys change version under the lock, so concurrent watchers
        // observe the transaction as one atomic modification.
        db.bump_versions(&write_keys);

        for line in &queued {
            let name = String::from_utf8_lossy(&line[0]).to_lowercase();
            // Capture the undo log before the command runs. Recorded but never
            // replayed: a runtime error does not roll back the transaction.
            if let Some(undo) = registry::lookup(&name).and_then(|spec| spec.undo) {
                undo_logs.push(undo(&db, &line[1..]));
            }

            match db.exec_with_lock(line) {
                Ok(result) => {
                    replies.push(result.reply);
                    aof_payloads.extend(result.aof);
                }
                Err(e) => replies.push(RespValue::Error(e.to_string())),
            }
        }
    } // All locks released here.

    trace!(
        undo_entries = undo_logs.iter().map(Vec::len).sum::<usize>(),
        "transaction undo log captured"
    );

    // One AOF payload per successful write command, emitted after release.
    for payload in aof_payloads {
        db.emit_aof(payload).await;
    }

    Ok(RespValue::Array(replies))
}
