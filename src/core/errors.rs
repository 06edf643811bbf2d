// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::num::{ParseFloatError, ParseIntError};
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
///
/// The `Display` strings double as the client-facing error messages, so every
/// variant that can reach a connection carries the exact Redis-style prefix
/// (`ERR`, `WRONGTYPE`, `NOAUTH`, `EXECABORT`, ...).
#[derive(Error, Debug, Clone)]
pub enum CitrineError {
    #[error("ERR io error: {0}")]
    Io(Arc<std::io::Error>),

    /// Sentinel used by the RESP decoder when a frame is not complete yet.
    /// Never sent to a client.
    #[error("incomplete data in stream")]
    IncompleteData,

    #[error("ERR Protocol error: '{0}'")]
    ProtocolError(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("ERR min or max is not a float")]
    InvalidRangeBorder,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("NOAUTH Authentication required")]
    AuthRequired,

    #[error("ERR invalid password")]
    InvalidPassword,

    #[error("EXECABORT Transaction discarded because of previous errors")]
    ExecAborted,

    #[error("ERR DB index is out of range")]
    DbIndexOutOfRange,

    #[error("ERR {0}")]
    InvalidState(String),

    #[error("ERR persistence error: {0}")]
    AofError(String),

    #[error("ERR internal error: {0}")]
    Internal(String),
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for CitrineError {
    fn from(e: std::io::Error) -> Self {
        CitrineError::Io(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for CitrineError {
    fn from(_: std::str::Utf8Error) -> Self {
        CitrineError::WrongType
    }
}

impl From<std::string::FromUtf8Error> for CitrineError {
    fn from(_: std::string::FromUtf8Error) -> Self {
        CitrineError::WrongType
    }
}

impl From<ParseIntError> for CitrineError {
    fn from(_: ParseIntError) -> Self {
        CitrineError::NotAnInteger
    }
}

impl From<ParseFloatError> for CitrineError {
    fn from(_: ParseFloatError) -> Self {
        CitrineError::NotAFloat
    }
}
