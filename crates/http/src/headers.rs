// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response head assembly.
//!
//! Heads are written into the connection's reusable output buffer so one
//! gathered write covers `[head, payload]`.

use loft_core::HttpStatus;

/// Value of the `Server` header.
pub const SERVER_NAME: &str = "loft";

/// `Content-Range` fields for a 206 response: inclusive byte window plus
/// the full entity size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: u64,
    pub last: u64,
    pub size: u64,
}

/// One response head, borrowed from per-request state.
#[derive(Debug, Clone)]
pub struct ResponseHead<'a> {
    pub status: HttpStatus,
    pub keep_alive: bool,
    /// Per-worker cached `Date` string; empty skips the header.
    pub date: &'a str,
    /// Per-worker cached `Expires` string; empty skips the header.
    pub expires: &'a str,
    pub last_modified: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
    /// Emit `Content-Encoding: deflate`.
    pub deflate: bool,
    /// Emit `Accept-Ranges: bytes` (set for file responses).
    pub accept_ranges: bool,
}

impl ResponseHead<'_> {
    /// A head with the given status and everything else off.
    pub fn new(status: HttpStatus) -> Self {
        Self {
            status,
            keep_alive: false,
            date: "",
            expires: "",
            last_modified: None,
            content_type: None,
            content_length: None,
            content_range: None,
            deflate: false,
            accept_ranges: false,
        }
    }

    /// Append the head, terminator included, to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let status = self.status;

        put(out, "HTTP/1.1 ");
        put(out, &status.code().to_string());
        put(out, " ");
        put(out, status.reason());
        put(out, "\r\nServer: ");
        put(out, SERVER_NAME);
        put(out, "\r\n");

        if !self.date.is_empty() {
            put(out, "Date: ");
            put(out, self.date);
            put(out, "\r\n");
        }
        if !self.expires.is_empty() && status.is_success() {
            put(out, "Expires: ");
            put(out, self.expires);
            put(out, "\r\n");
        }
        if let Some(lm) = self.last_modified {
            put(out, "Last-Modified: ");
            put(out, lm);
            put(out, "\r\n");
        }
        if let Some(ct) = self.content_type {
            put(out, "Content-Type: ");
            put(out, ct);
            put(out, "\r\n");
        }
        if let Some(len) = self.content_length {
            put(out, "Content-Length: ");
            put(out, &len.to_string());
            put(out, "\r\n");
        }
        if let Some(cr) = self.content_range {
            put(out, "Content-Range: bytes ");
            put(out, &cr.first.to_string());
            put(out, "-");
            put(out, &cr.last.to_string());
            put(out, "/");
            put(out, &cr.size.to_string());
            put(out, "\r\n");
        }
        if self.deflate {
            put(out, "Content-Encoding: deflate\r\n");
        }
        if self.accept_ranges {
            put(out, "Accept-Ranges: bytes\r\n");
        }
        put(
            out,
            if self.keep_alive {
                "Connection: keep-alive\r\n\r\n"
            } else {
                "Connection: close\r\n\r\n"
            },
        );
    }
}

fn put(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
#[path = "headers_tests.rs"]
mod tests;
