// tests/common/mod.rs

//! Shared helpers for the integration test suite.

#![allow(dead_code)]

use bytes::Bytes;
use citrine::config::Config;
use citrine::connection::Session;
use citrine::core::RespValue;
use citrine::core::database::Engine;
use std::sync::Arc;

/// A small configuration so each test engine stays cheap to build.
pub fn test_config() -> Config {
    Config {
        databases: 2,
        ..Default::default()
    }
}

pub fn test_engine() -> Arc<Engine> {
    Engine::new(Arc::new(test_config()))
}

/// Builds a command line from whitespace-separated words.
pub fn line(cmd: &str) -> Vec<Bytes> {
    cmd.split_whitespace()
        .map(|word| Bytes::copy_from_slice(word.as_bytes()))
        .collect()
}

/// Builds a command line from raw parts, for binary-safe arguments.
pub fn line_parts(parts: &[&[u8]]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
}

/// Runs one whitespace-separated command through the engine.
pub async fn run(engine: &Arc<Engine>, session: &mut Session, cmd: &str) -> RespValue {
    engine.exec(session, &line(cmd)).await
}

pub fn bulk(s: &str) -> RespValue {
    RespValue::BulkString(Bytes::copy_from_slice(s.as_bytes()))
}

pub fn int(i: i64) -> RespValue {
    RespValue::Integer(i)
}

pub fn ok() -> RespValue {
    RespValue::ok()
}

/// Asserts the reply is an error whose message contains `needle`.
pub fn assert_error_contains(reply: &RespValue, needle: &str) {
    match reply {
        RespValue::Error(msg) => assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got {msg:?}"
        ),
        other => panic!("expected error reply, got {other:?}"),
    }
}
