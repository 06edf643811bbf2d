// src/core/database/commands/mod.rs

//! The data command implementations, grouped by value family. Each family
//! contributes its descriptors to the registry through `all_specs`.

pub mod generic;
pub mod hash;
pub mod list;
pub mod set;
pub mod string;
pub mod undo;
pub mod zset;

use crate::core::CitrineError;
use crate::core::database::registry::CommandSpec;
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn all_specs() -> Vec<CommandSpec> {
    let mut specs = Vec::new();
    specs.extend(string::specs());
    specs.extend(generic::specs());
    specs.extend(list::specs());
    specs.extend(hash::specs());
    specs.extend(set::specs());
    specs.extend(zset::specs());
    specs
}

// --- Shared argument helpers ---

pub(crate) fn parse_i64(raw: &Bytes) -> Result<i64, CitrineError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CitrineError::NotAnInteger)
}

pub(crate) fn parse_f64(raw: &Bytes) -> Result<f64, CitrineError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or(CitrineError::NotAFloat)
}

pub(crate) fn lowercase(raw: &Bytes) -> String {
    String::from_utf8_lossy(raw).to_lowercase()
}

pub(crate) fn unix_millis(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub(crate) fn from_unix_millis(ms: i64) -> SystemTime {
    if ms <= 0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::from_millis(ms as u64)
    }
}

/// The absolute-expiry line recorded to the AOF for every TTL-setting
/// command, making replay wall-clock safe.
pub(crate) fn pexpireat_cmd(key: &Bytes, at: SystemTime) -> Vec<Bytes> {
    vec![
        Bytes::from_static(b"PEXPIREAT"),
        key.clone(),
        Bytes::from(unix_millis(at).to_string()),
    ]
}

/// Normalizes Redis-style inclusive `[start, stop]` indices (negative counts
/// from the end) against a collection of `len` items. Returns the resolved
/// inclusive range, or `None` when it is empty.
pub(crate) fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Glob-style pattern matching for `KEYS`: `*`, `?`, `[...]` classes and
/// backslash escapes over raw bytes.
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    fn matches(p: &[u8], t: &[u8]) -> bool {
        if p.is_empty() {
            return t.is_empty();
        }
        match p[0] {
            b'*' => {
                // Collapse consecutive stars, then try every split point.
                let rest = &p[1..];
                (0..=t.len()).any(|i| matches(rest, &t[i..]))
            }
            b'?' => !t.is_empty() && matches(&p[1..], &t[1..]),
            b'[' => {
                let Some(close) = p.iter().position(|&b| b == b']') else {
                    return !t.is_empty() && p[0] == t[0] && matches(&p[1..], &t[1..]);
                };
                if t.is_empty() {
                    return false;
                }
                let (negate, class) = if p.len() > 1 && p[1] == b'^' {
                    (true, &p[2..close])
                } else {
                    (false, &p[1..close])
                };
                let mut hit = false;
                let mut i = 0;
                while i < class.len() {
                    if i + 2 < class.len() && class[i + 1] == b'-' {
                        if class[i] <= t[0] && t[0] <= class[i + 2] {
                            hit = true;
                        }
                        i += 3;
                    } else {
                        if class[i] == t[0] {
                            hit = true;
                        }
                        i += 1;
                    }
                }
                if hit != negate {
                    matches(&p[close + 1..], &t[1..])
                } else {
                    false
                }
            }
            b'\\' if p.len() > 1 => !t.is_empty() && p[1] == t[0] && matches(&p[2..], &t[1..]),
            byte => !t.is_empty() && byte == t[0] && matches(&p[1..], &t[1..]),
        }
    }
    matches(pattern, text)
}
