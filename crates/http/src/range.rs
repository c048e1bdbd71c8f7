// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Range` header parsing and byte-window arithmetic.

/// A parsed `bytes=start-end` header. `-1` marks an absent endpoint
/// (`bytes=900-` leaves `to` at `-1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub from: i64,
    pub to: i64,
}

/// The resolved serving window for a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeWindow {
    /// Serve the whole file with 200.
    Whole,
    /// Serve `len` bytes starting at `from` with 206.
    Partial { from: u64, len: u64 },
    /// 416 Range Not Satisfiable.
    Unsatisfiable,
}

/// Parse a `Range` header value.
///
/// Only the single `bytes=start-end` form is recognised; suffix ranges
/// (`bytes=-500`), multipart ranges, and other units are ignored, which
/// callers treat as "serve the whole file".
pub fn parse_range(value: &str) -> Option<ByteRange> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (from, to) = spec.split_once('-')?;
    let from = from.trim();
    let to = to.trim();
    if from.is_empty() {
        return None;
    }
    let from: i64 = from.parse().ok().filter(|n| *n >= 0)?;
    let to: i64 = if to.is_empty() {
        -1
    } else {
        to.parse().ok().filter(|n| *n >= 0)?
    };
    Some(ByteRange { from, to })
}

impl ByteRange {
    /// Resolve this range against a file of `size` bytes.
    ///
    /// End positions are inclusive as on the wire: `bytes=0-99` is a
    /// 100-byte window. `bytes=0-` has both endpoints at their defaults
    /// (`from = 0`, `to` absent) and serves the whole file with 200.
    /// Either endpoint at or past the file size is unsatisfiable rather
    /// than clamped.
    pub fn window(self, size: u64) -> RangeWindow {
        let ByteRange { from, to } = self;
        if from <= 0 && to <= 0 {
            return RangeWindow::Whole;
        }
        let size = size as i64;
        if from >= size {
            return RangeWindow::Unsatisfiable;
        }
        if to >= 0 {
            if to < from || to >= size {
                return RangeWindow::Unsatisfiable;
            }
            return RangeWindow::Partial {
                from: from as u64,
                len: (to - from + 1) as u64,
            };
        }
        RangeWindow::Partial {
            from: from as u64,
            len: (size - from) as u64,
        }
    }
}

#[cfg(test)]
#[path = "range_tests.rs"]
mod tests;
