// src/core/protocol/resp_frame.rs

//! Implements the RESP (REdis Serialization Protocol) frame structure and the
//! corresponding `Encoder` and `Decoder` for network communication.

use crate::core::CitrineError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The CRLF (Carriage Return, Line Feed) sequence used to terminate lines in RESP.
const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Protocol-level limits to prevent denial-of-service from malformed frames.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024; // 512MB

/// An enum representing a single frame in the RESP protocol.
/// This is the low-level representation of data exchanged between client and server.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// A convenience method to encode a frame into a `Vec<u8>`.
    /// Used for AOF persistence and replication listeners, where a complete
    /// byte vector is needed.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(self, &mut buf);
        buf.to_vec()
    }

    /// Builds the multi-bulk frame for a command line.
    pub fn from_cmdline(line: &[Bytes]) -> RespFrame {
        RespFrame::Array(line.iter().cloned().map(RespFrame::BulkString).collect())
    }

    /// Interprets this frame as a command line, the only shape clients (and the
    /// AOF replay path) are allowed to send: a multi-bulk of bulk strings, or
    /// the inline fallback which the decoder already normalized to the same.
    pub fn into_cmdline(self) -> Result<Vec<Bytes>, CitrineError> {
        match self {
            RespFrame::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    RespFrame::BulkString(b) => Ok(b),
                    RespFrame::SimpleString(s) => Ok(Bytes::from(s)),
                    _ => Err(CitrineError::ProtocolError(
                        "expected bulk string in multibulk".into(),
                    )),
                })
                .collect(),
            _ => Err(CitrineError::ProtocolError(
                "expected multibulk request".into(),
            )),
        }
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug, Default)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = CitrineError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst);
        Ok(())
    }
}

fn write_int(dst: &mut BytesMut, n: i64) {
    let mut buf = itoa::Buffer::new();
    dst.extend_from_slice(buf.format(n).as_bytes());
}

fn write_len(dst: &mut BytesMut, n: usize) {
    let mut buf = itoa::Buffer::new();
    dst.extend_from_slice(buf.format(n).as_bytes());
}

/// Encodes a `RespFrame` into a buffer according to the RESP specification.
fn encode_frame(item: &RespFrame, dst: &mut BytesMut) {
    match item {
        RespFrame::SimpleString(s) => {
            dst.extend_from_slice(b"+");
            dst.extend_from_slice(s.as_bytes());
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Error(s) => {
            dst.extend_from_slice(b"-");
            dst.extend_from_slice(s.as_bytes());
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Integer(i) => {
            dst.extend_from_slice(b":");
            write_int(dst, *i);
            dst.extend_from_slice(CRLF);
        }
        RespFrame::BulkString(b) => {
            dst.extend_from_slice(b"$");
            write_len(dst, b.len());
            dst.extend_from_slice(CRLF);
            dst.extend_from_slice(b);
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Null => {
            dst.extend_from_slice(b"$-1\r\n");
        }
        RespFrame::NullArray => {
            dst.extend_from_slice(b"*-1\r\n");
        }
        RespFrame::Array(arr) => {
            dst.extend_from_slice(b"*");
            write_len(dst, arr.len());
            dst.extend_from_slice(CRLF);
            for frame in arr {
                encode_frame(frame, dst);
            }
        }
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = CitrineError;

    /// Decodes a `RespFrame` from a `BytesMut` buffer.
    ///
    /// Returns `Ok(None)` if the buffer does not contain a full frame yet,
    /// allowing the `Framed` stream to wait for more data from the network.
    ///
    /// A malformed header consumes up to the next CRLF before returning the
    /// error, so the connection can report it and keep reading.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match parse_frame(src) {
            Ok((frame, len)) => {
                src.advance(len);
                Ok(Some(frame))
            }
            Err(CitrineError::IncompleteData) => Ok(None),
            Err(e) => {
                if let Some(pos) = find_crlf(src) {
                    src.advance(pos + CRLF_LEN);
                } else {
                    src.clear();
                }
                Err(e)
            }
        }
    }
}

/// The main parsing entry point. It inspects the first byte (the type prefix)
/// and dispatches to the appropriate parsing function. Any other first byte
/// falls back to the inline command format.
///
/// Returns the parsed frame together with the number of bytes it consumed.
pub fn parse_frame(src: &[u8]) -> Result<(RespFrame, usize), CitrineError> {
    if src.is_empty() {
        return Err(CitrineError::IncompleteData);
    }
    match src[0] {
        b'+' => parse_simple_string(src),
        b'-' => parse_error(src),
        b':' => parse_integer(src),
        b'$' => parse_bulk_string(src),
        b'*' => parse_array(src),
        _ => parse_inline(src),
    }
}

/// Helper function to find the next CRLF sequence in a buffer.
fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(CRLF_LEN).position(|window| window == CRLF)
}

/// Parses a single line (up to CRLF) from a buffer.
fn parse_line(src: &[u8]) -> Result<(&[u8], usize), CitrineError> {
    find_crlf(src)
        .map(|pos| (&src[..pos], pos + CRLF_LEN))
        .ok_or(CitrineError::IncompleteData)
}

fn parse_decimal(line: &[u8]) -> Result<isize, CitrineError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<isize>().ok())
        .ok_or_else(|| {
            CitrineError::ProtocolError(format!(
                "invalid length '{}'",
                String::from_utf8_lossy(line)
            ))
        })
}

/// Parses a Simple String (e.g., `+OK\r\n`).
fn parse_simple_string(src: &[u8]) -> Result<(RespFrame, usize), CitrineError> {
    let (line, len) = parse_line(&src[1..])?;
    Ok((
        RespFrame::SimpleString(String::from_utf8_lossy(line).to_string()),
        len + 1,
    ))
}

/// Parses an Error (e.g., `-ERR message\r\n`).
fn parse_error(src: &[u8]) -> Result<(RespFrame, usize), CitrineError> {
    let (line, len) = parse_line(&src[1..])?;
    Ok((
        RespFrame::Error(String::from_utf8_lossy(line).to_string()),
        len + 1,
    ))
}

/// Parses an Integer (e.g., `:1000\r\n`).
fn parse_integer(src: &[u8]) -> Result<(RespFrame, usize), CitrineError> {
    let (line, len) = parse_line(&src[1..])?;
    let i = std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            CitrineError::ProtocolError(format!(
                "invalid integer '{}'",
                String::from_utf8_lossy(line)
            ))
        })?;
    Ok((RespFrame::Integer(i), len + 1))
}

/// Parses a Bulk String (e.g., `$5\r\nhello\r\n`). `$-1\r\n` is the null bulk.
fn parse_bulk_string(src: &[u8]) -> Result<(RespFrame, usize), CitrineError> {
    let (line, len_of_line) = parse_line(&src[1..])?;
    let str_len = parse_decimal(line)?;

    if str_len == -1 {
        return Ok((RespFrame::Null, len_of_line + 1));
    }
    if str_len < 0 || str_len as usize > MAX_BULK_STRING_SIZE {
        return Err(CitrineError::ProtocolError(
            "invalid bulk length".to_string(),
        ));
    }

    let str_len = str_len as usize;
    let total_len_prefix = len_of_line + 1;
    // The entire bulk string (data plus final CRLF) must be in the buffer.
    if src.len() < total_len_prefix + str_len + CRLF_LEN {
        return Err(CitrineError::IncompleteData);
    }
    if &src[total_len_prefix + str_len..total_len_prefix + str_len + CRLF_LEN] != CRLF {
        return Err(CitrineError::ProtocolError(
            "bulk string missing terminator".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&src[total_len_prefix..total_len_prefix + str_len]);
    Ok((RespFrame::BulkString(data), total_len_prefix + str_len + CRLF_LEN))
}

/// Parses an Array (e.g., `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`). `*-1\r\n` is
/// the null array, `*0\r\n` the empty one.
fn parse_array(src: &[u8]) -> Result<(RespFrame, usize), CitrineError> {
    let (line, len_of_line) = parse_line(&src[1..])?;
    let arr_len = parse_decimal(line)?;

    if arr_len == -1 {
        return Ok((RespFrame::NullArray, len_of_line + 1));
    }
    if arr_len < 0 || arr_len as usize > MAX_FRAME_ELEMENTS {
        return Err(CitrineError::ProtocolError(
            "invalid multibulk length".to_string(),
        ));
    }

    let arr_len = arr_len as usize;
    let mut frames = Vec::with_capacity(arr_len);
    let mut cursor = len_of_line + 1;

    for _ in 0..arr_len {
        let (frame, frame_len) = parse_frame(&src[cursor..])?;
        frames.push(frame);
        cursor += frame_len;
    }

    Ok((RespFrame::Array(frames), cursor))
}

/// Fallback for the inline command format: a bare line split on whitespace,
/// normalized into the same multi-bulk shape as a regular request.
fn parse_inline(src: &[u8]) -> Result<(RespFrame, usize), CitrineError> {
    let (line, len) = parse_line(src)?;
    let frames = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| RespFrame::BulkString(Bytes::copy_from_slice(word)))
        .collect();
    Ok((RespFrame::Array(frames), len))
}
