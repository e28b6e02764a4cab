//! Protocol codec
//!
//! Incremental encoding and decoding of the HTTP/1.1 subset.
//!
//! ## Wire Format
//!
//! ### Request
//! ```text
//! METHOD SP target SP HTTP/1.x CRLF
//! (Name: value CRLF)*
//! CRLF
//! body (Content-Length bytes)
//! ```
//!
//! ### Response
//! ```text
//! HTTP/1.1 SP code SP reason CRLF
//! (Name: value CRLF)*
//! CRLF
//! body (Content-Length bytes)
//! ```
//!
//! Decoders take a growing `BytesMut`, return `Ok(None)` until a whole
//! message is buffered, then split exactly that message off the front.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::error::KvError;

use super::{Method, Request, Response, Status};

/// Largest accepted request/response head (start line + headers)
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Why a buffered message could not be decoded
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("request body requires a Content-Length")]
    LengthRequired,

    #[error("body of {length} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { length: usize, limit: usize },
}

impl DecodeError {
    /// Status to answer a request that failed this way
    pub fn status(&self) -> Status {
        match self {
            DecodeError::Malformed(_) => Status::BadRequest,
            DecodeError::LengthRequired => Status::LengthRequired,
            DecodeError::BodyTooLarge { .. } => Status::PayloadTooLarge,
        }
    }
}

impl From<DecodeError> for KvError {
    fn from(err: DecodeError) -> Self {
        KvError::Protocol(err.to_string())
    }
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut message = Vec::with_capacity(128 + request.body.len());

    message.extend_from_slice(
        format!(
            "{} {} HTTP/1.{}\r\n",
            request.method.as_str(),
            request.target,
            request.minor_version
        )
        .as_bytes(),
    );
    for (name, value) in &request.headers {
        message.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    if request.method != Method::Get || !request.body.is_empty() {
        message.extend_from_slice(format!("Content-Length: {}\r\n", request.body.len()).as_bytes());
    }
    message.extend_from_slice(b"\r\n");
    message.extend_from_slice(&request.body);

    message
}

/// Decode one request from the front of `buf`
///
/// The body limit is checked against `Content-Length` before any body byte
/// is buffered.
pub fn decode_request(buf: &mut BytesMut, max_body: usize) -> Result<Option<Request>, DecodeError> {
    let Some(head_len) = find_head_end(buf)? else {
        return Ok(None);
    };

    let (start_line, headers) = parse_head(&buf[..head_len])?;

    // Parse request line
    let mut parts = start_line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(DecodeError::Malformed(format!(
            "invalid request line: {start_line:?}"
        )));
    };
    let minor_version = parse_version(version)?;
    if !target.starts_with('/') {
        return Err(DecodeError::Malformed(format!(
            "unsupported request target: {target:?}"
        )));
    }
    let method = Method::parse(method);
    let target = target.to_string();

    // Determine body length
    if header_value(&headers, "transfer-encoding").is_some() {
        return Err(DecodeError::LengthRequired);
    }
    let body_len = match content_length(&headers)? {
        Some(length) => length,
        None if matches!(method, Method::Put | Method::Post | Method::Patch) => {
            return Err(DecodeError::LengthRequired)
        }
        None => 0,
    };
    if body_len > max_body {
        return Err(DecodeError::BodyTooLarge {
            length: body_len,
            limit: max_body,
        });
    }

    if buf.len() < head_len + body_len {
        return Ok(None);
    }

    let _head = buf.split_to(head_len);
    let body = buf.split_to(body_len).freeze();

    Ok(Some(Request {
        method,
        target,
        minor_version,
        headers,
        body,
    }))
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(response: &Response, keep_alive: bool) -> Vec<u8> {
    let status = response.status;
    let mut message = Vec::with_capacity(128 + response.body.len());

    message.extend_from_slice(
        format!("HTTP/1.1 {} {}\r\n", status.code(), status.reason()).as_bytes(),
    );
    if status != Status::NoContent {
        message.extend_from_slice(format!("Content-Length: {}\r\n", response.body.len()).as_bytes());
    }
    if !response.body.is_empty() {
        message.extend_from_slice(b"Content-Type: application/json\r\n");
    }
    let connection = if keep_alive { "keep-alive" } else { "close" };
    message.extend_from_slice(format!("Connection: {connection}\r\n\r\n").as_bytes());
    message.extend_from_slice(&response.body);

    message
}

/// Decode one response from the front of `buf`
pub fn decode_response(buf: &mut BytesMut) -> Result<Option<Response>, DecodeError> {
    let Some(head_len) = find_head_end(buf)? else {
        return Ok(None);
    };

    let (start_line, headers) = parse_head(&buf[..head_len])?;

    // Parse status line: version, code, reason (reason may contain spaces)
    let mut parts = start_line.splitn(3, ' ');
    let (Some(version), Some(code)) = (parts.next(), parts.next()) else {
        return Err(DecodeError::Malformed(format!(
            "invalid status line: {start_line:?}"
        )));
    };
    parse_version(version)?;
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(Status::from_code)
        .ok_or_else(|| DecodeError::Malformed(format!("unknown status code: {code:?}")))?;

    let body_len = match status {
        Status::NoContent => 0,
        _ => content_length(&headers)?.unwrap_or(0),
    };

    if buf.len() < head_len + body_len {
        return Ok(None);
    }

    let _head = buf.split_to(head_len);
    let body: Bytes = buf.split_to(body_len).freeze();

    Ok(Some(Response { status, body }))
}

// =============================================================================
// Head parsing helpers
// =============================================================================

/// Length of the head including its blank line, once fully buffered
fn find_head_end(buf: &[u8]) -> Result<Option<usize>, DecodeError> {
    match buf
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
    {
        Some(pos) if pos + HEAD_TERMINATOR.len() <= MAX_HEAD_SIZE => {
            Ok(Some(pos + HEAD_TERMINATOR.len()))
        }
        None if buf.len() < MAX_HEAD_SIZE => Ok(None),
        _ => Err(DecodeError::Malformed(format!(
            "message head exceeds {MAX_HEAD_SIZE} bytes"
        ))),
    }
}

/// Split a head into its start line and header fields
fn parse_head(head: &[u8]) -> Result<(String, Vec<(String, String)>), DecodeError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| DecodeError::Malformed("message head is not UTF-8".to_string()))?;

    let mut lines = text.trim_end_matches("\r\n").split("\r\n");
    let start_line = lines.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(DecodeError::Malformed(format!("invalid header line: {line:?}")));
        };
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok((start_line, headers))
}

fn parse_version(version: &str) -> Result<u8, DecodeError> {
    match version {
        "HTTP/1.1" => Ok(1),
        "HTTP/1.0" => Ok(0),
        other => Err(DecodeError::Malformed(format!(
            "unsupported HTTP version: {other:?}"
        ))),
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(field, _)| field.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn content_length(headers: &[(String, String)]) -> Result<Option<usize>, DecodeError> {
    header_value(headers, "content-length")
        .map(|value| {
            value
                .parse::<usize>()
                .map_err(|_| DecodeError::Malformed(format!("invalid Content-Length: {value:?}")))
        })
        .transpose()
}

// =============================================================================
// Key encoding in paths
// =============================================================================

/// Percent-encode everything outside the RFC 3986 unreserved set
pub fn percent_encode(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Decode `%XX` escapes; `None` on a broken escape or non-UTF-8 result
pub fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            let hex = std::str::from_utf8(hex).ok()?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(decoded).ok()
}
