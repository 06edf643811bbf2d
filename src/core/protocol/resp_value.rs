// src/core/protocol/resp_value.rs

//! Defines a simplified value type for use within the command execution layer.

use bytes::Bytes;

/// `RespValue` is a simplified version of `RespFrame`.
///
/// It's used as the return type for command execution logic: the command layer
/// only ever produces values, it never parses them. `NoReply` marks responses
/// that are delivered out-of-band (Pub/Sub confirmations pushed through the
/// connection's outbox) so the dispatcher knows to send nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    BulkString(Bytes),
    Integer(i64),
    Array(Vec<RespValue>),
    Null,
    NullArray,
    Error(String),
    NoReply,
}

impl RespValue {
    /// The canonical `+OK` status reply.
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }
}

/// Implements the conversion from the internal `RespValue` to the wire-protocol `RespFrame`.
impl From<RespValue> for super::RespFrame {
    fn from(val: RespValue) -> Self {
        match val {
            RespValue::SimpleString(s) => super::RespFrame::SimpleString(s),
            RespValue::BulkString(b) => super::RespFrame::BulkString(b),
            RespValue::Integer(i) => super::RespFrame::Integer(i),
            RespValue::Array(arr) => {
                super::RespFrame::Array(arr.into_iter().map(Into::into).collect())
            }
            RespValue::Null => super::RespFrame::Null,
            RespValue::NullArray => super::RespFrame::NullArray,
            RespValue::Error(s) => super::RespFrame::Error(s),
            // `NoReply` should be filtered out before reaching the wire; encode
            // it as an empty status if it ever leaks.
            RespValue::NoReply => super::RespFrame::SimpleString(String::new()),
        }
    }
}
