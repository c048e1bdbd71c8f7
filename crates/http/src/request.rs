// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental HTTP/1.x request parsing.
//!
//! The connection task accumulates bytes in its read buffer and calls
//! [`parse_request`] after every read. The parser either consumes one
//! complete request head or reports that more bytes are needed; pipelined
//! requests are handled by the caller re-invoking the parser on the
//! remainder of the buffer.

use percent_encoding::percent_decode_str;
use thiserror::Error;

use crate::range::{parse_range, ByteRange};

/// Hard cap on the request head (request line + headers).
pub const MAX_REQUEST_SIZE: usize = 8 * 1024;

/// Errors from request parsing. All of them terminate the connection;
/// only `UnsupportedMethod` gets a response first.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("request head exceeds {MAX_REQUEST_SIZE} bytes")]
    TooLarge,

    #[error("malformed request")]
    Malformed,

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
}

/// Request methods the server serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

/// A parsed request head.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Percent-decoded path with leading slashes stripped; empty for `/`.
    pub path: String,
    /// Decoded query-string key/value pairs in arrival order.
    pub query: Vec<(String, String)>,
    /// True for HTTP/1.1, false for HTTP/1.0.
    pub http_11: bool,
    /// Effective keep-alive after version defaults and `Connection`.
    pub keep_alive: bool,
    /// `If-Modified-Since` parsed to epoch seconds.
    pub if_modified_since: Option<i64>,
    /// Single `bytes=start-end` range, when present and well-formed.
    pub range: Option<ByteRange>,
    /// Client advertised `deflate` in `Accept-Encoding`.
    pub accepts_deflate: bool,
}

/// Result of a parse attempt over the read buffer.
#[derive(Debug)]
pub enum ParseOutcome {
    /// One request head was consumed; `consumed` bytes can be dropped from
    /// the front of the buffer.
    Complete { request: Request, consumed: usize },
    /// The head is not yet complete; read more bytes.
    Partial,
}

/// Parse one request head from the front of `buf`.
pub fn parse_request(buf: &[u8]) -> Result<ParseOutcome, ParseError> {
    let Some(head_len) = find_head_end(buf) else {
        if buf.len() > MAX_REQUEST_SIZE {
            return Err(ParseError::TooLarge);
        }
        return Ok(ParseOutcome::Partial);
    };
    if head_len > MAX_REQUEST_SIZE {
        return Err(ParseError::TooLarge);
    }

    let head = std::str::from_utf8(&buf[..head_len]).map_err(|_| ParseError::Malformed)?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::Malformed)?;
    let (method, target, http_11) = parse_request_line(request_line)?;
    let (path, query) = parse_target(target)?;

    let mut keep_alive = http_11;
    let mut if_modified_since = None;
    let mut range = None;
    let mut accepts_deflate = false;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(ParseError::Malformed);
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("connection") {
            if value.eq_ignore_ascii_case("close") {
                keep_alive = false;
            } else if value.eq_ignore_ascii_case("keep-alive") {
                keep_alive = true;
            }
        } else if name.eq_ignore_ascii_case("if-modified-since") {
            if_modified_since = loft_core::parse_http_date(value);
        } else if name.eq_ignore_ascii_case("range") {
            range = parse_range(value);
        } else if name.eq_ignore_ascii_case("accept-encoding") {
            accepts_deflate = accepts_deflate || advertises_deflate(value);
        }
    }

    Ok(ParseOutcome::Complete {
        request: Request {
            method,
            path,
            query,
            http_11,
            keep_alive,
            if_modified_since,
            range,
            accepts_deflate,
        },
        consumed: head_len + 4,
    })
}

/// Find the end of the head (index of the `\r\n\r\n` terminator).
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_request_line(line: &str) -> Result<(Method, &str, bool), ParseError> {
    let mut parts = line.split(' ');
    let method = parts.next().ok_or(ParseError::Malformed)?;
    let target = parts.next().ok_or(ParseError::Malformed)?;
    let version = parts.next().ok_or(ParseError::Malformed)?;
    if parts.next().is_some() {
        return Err(ParseError::Malformed);
    }

    let method = match method {
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        other if other.chars().all(|c| c.is_ascii_uppercase()) && !other.is_empty() => {
            return Err(ParseError::UnsupportedMethod(other.to_string()))
        }
        _ => return Err(ParseError::Malformed),
    };

    let http_11 = match version {
        "HTTP/1.1" => true,
        "HTTP/1.0" => false,
        _ => return Err(ParseError::Malformed),
    };

    Ok((method, target, http_11))
}

/// Split the target into decoded path and query pairs.
///
/// The path is percent-decoded and returned without leading slashes; the
/// resolver works root-relative.
fn parse_target(target: &str) -> Result<(String, Vec<(String, String)>), ParseError> {
    if !target.starts_with('/') {
        return Err(ParseError::Malformed);
    }
    let (raw_path, raw_query) = match target.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (target, None),
    };

    let path = decode_component(raw_path, false)?;
    let path = path.trim_start_matches('/').to_string();

    let mut query = Vec::new();
    if let Some(raw_query) = raw_query {
        for pair in raw_query.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            query.push((decode_component(k, true)?, decode_component(v, true)?));
        }
    }

    Ok((path, query))
}

/// Percent-decode one component. In query position, `+` decodes to space.
fn decode_component(raw: &str, query_position: bool) -> Result<String, ParseError> {
    let raw = if query_position && raw.contains('+') {
        std::borrow::Cow::Owned(raw.replace('+', " "))
    } else {
        std::borrow::Cow::Borrowed(raw)
    };
    percent_decode_str(&raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| ParseError::Malformed)
}

/// True if an `Accept-Encoding` value lists deflate with nonzero quality.
fn advertises_deflate(value: &str) -> bool {
    value.split(',').any(|token| {
        let mut parts = token.trim().split(';');
        let coding = parts.next().unwrap_or("").trim();
        if !coding.eq_ignore_ascii_case("deflate") {
            return false;
        }
        // Reject an explicit q=0
        !parts.any(|p| {
            let p = p.trim();
            p.eq_ignore_ascii_case("q=0") || p.eq_ignore_ascii_case("q=0.0")
        })
    })
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
