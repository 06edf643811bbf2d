// src/core/database/commands/undo.rs

//! Builders for per-command undo logs: the inverse command lines that would
//! restore a key to its pre-write state. Captured before execution inside
//! EXEC; never replayed on runtime errors.

use super::pexpireat_cmd;
use crate::core::CmdLine;
use crate::core::database::Database;
use bytes::Bytes;
use std::sync::Arc;

/// The inverse of any write against `keys`: delete whatever the write left
/// behind, then rebuild the prior entity and its TTL.
pub fn rollback_given_keys(db: &Arc<Database>, keys: &[Bytes]) -> Vec<CmdLine> {
    let mut cmds = Vec::new();
    for key in keys {
        match db.get_entity(key) {
            None => cmds.push(vec![Bytes::from_static(b"DEL"), key.clone()]),
            Some(entity) => {
                cmds.push(vec![Bytes::from_static(b"DEL"), key.clone()]);
                cmds.push(entity.to_rebuild_cmd(key));
                if let Some(at) = db.expiration(key) {
                    cmds.push(pexpireat_cmd(key, at));
                }
            }
        }
    }
    cmds
}

/// Undo for commands whose only written key is the first argument.
pub fn undo_first_key(db: &Arc<Database>, args: &[Bytes]) -> Vec<CmdLine> {
    rollback_given_keys(db, &args[..1])
}

/// Undo for commands writing every argument as a key (DEL and friends).
pub fn undo_all_keys(db: &Arc<Database>, args: &[Bytes]) -> Vec<CmdLine> {
    rollback_given_keys(db, args)
}

/// Undo for MSET-style interleaved `key value` argument lists.
pub fn undo_interleaved_keys(db: &Arc<Database>, args: &[Bytes]) -> Vec<CmdLine> {
    let keys: Vec<Bytes> = args.iter().step_by(2).cloned().collect();
    rollback_given_keys(db, &keys)
}
