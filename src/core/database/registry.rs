// src/core/database/registry.rs

//! The command table: every data command is a descriptor carrying its
//! executor, key-preparation and undo functions plus arity and flags,
//! registered under its lowercase name.

use crate::core::database::Database;
use crate::core::database::commands;
use crate::core::{CitrineError, CmdLine, RespValue};
use bitflags::bitflags;
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

bitflags! {
    /// Properties of a command, used by the dispatcher.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u32 {
        /// The command modifies the dataset.
        const WRITE    = 1 << 0;
        /// The command only reads data.
        const READONLY = 1 << 1;
    }
}

/// The outcome of a command execution: the client reply plus the command
/// lines to append to the AOF when the write succeeded.
#[derive(Debug)]
pub struct CmdResult {
    pub reply: RespValue,
    pub aof: Vec<CmdLine>,
}

impl CmdResult {
    pub fn reply(reply: RespValue) -> Self {
        Self {
            reply,
            aof: Vec::new(),
        }
    }

    pub fn with_aof(reply: RespValue, aof: Vec<CmdLine>) -> Self {
        Self { reply, aof }
    }
}

/// Executes the command against the keyspace. `args` excludes the command name.
pub type ExecFn = fn(&Arc<Database>, &[Bytes]) -> Result<CmdResult, CitrineError>;
/// Computes `(write_keys, read_keys)` from the arguments, for locking and
/// version bumping. Runs before any lock is taken.
pub type PrepareFn = fn(&[Bytes]) -> (Vec<Bytes>, Vec<Bytes>);
/// Produces the inverse command lines that would undo the call given the
/// current keyspace state. Captured before execution inside EXEC.
pub type UndoFn = fn(&Arc<Database>, &[Bytes]) -> Vec<CmdLine>;

pub struct CommandSpec {
    pub name: &'static str,
    pub exec: ExecFn,
    pub prepare: PrepareFn,
    pub undo: Option<UndoFn>,
    /// Positive: exact argument count including the command name.
    /// Negative: minimum argument count including the command name.
    pub arity: i32,
    pub flags: CommandFlags,
}

/// Validates a command line length against the declared arity.
pub fn validate_arity(arity: i32, line_len: usize) -> bool {
    if arity >= 0 {
        line_len == arity as usize
    } else {
        line_len >= (-arity) as usize
    }
}

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    REGISTRY.get(name)
}

static REGISTRY: Lazy<HashMap<&'static str, CommandSpec>> = Lazy::new(|| {
    let mut table = HashMap::new();
    for spec in commands::all_specs() {
        table.insert(spec.name, spec);
    }
    table
});

// --- Shared prepare helpers ---

pub fn prepare_write_first_key(args: &[Bytes]) -> (Vec<Bytes>, Vec<Bytes>) {
    (vec![args[0].clone()], vec![])
}

pub fn prepare_read_first_key(args: &[Bytes]) -> (Vec<Bytes>, Vec<Bytes>) {
    (vec![], vec![args[0].clone()])
}

pub fn prepare_write_all_keys(args: &[Bytes]) -> (Vec<Bytes>, Vec<Bytes>) {
    (args.to_vec(), vec![])
}

pub fn prepare_read_all_keys(args: &[Bytes]) -> (Vec<Bytes>, Vec<Bytes>) {
    (vec![], args.to_vec())
}

pub fn prepare_no_keys(_args: &[Bytes]) -> (Vec<Bytes>, Vec<Bytes>) {
    (vec![], vec![])
}
