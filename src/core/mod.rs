// src/core/mod.rs

pub mod aof;
pub mod database;
pub mod errors;
pub mod locking;
pub mod protocol;
pub mod pubsub;
pub mod storage;
pub mod timewheel;

pub use errors::CitrineError;
pub use protocol::{RespFrame, RespValue};

use bytes::Bytes;

/// One command line: the command name followed by its arguments, binary-safe.
pub type CmdLine = Vec<Bytes>;
