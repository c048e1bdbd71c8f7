// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-built serving artifacts.
//!
//! An artifact is the cached representation of one request path: small
//! files are held in memory (with a deflate copy when it pays for
//! itself), large files are recorded as a path + size stub for streaming,
//! and index-less directories are pre-rendered HTML listings.

use std::io::Write;
use std::path::PathBuf;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;
use tracing::debug;

use loft_core::time_fmt::http_date;
use loft_http::mime_for_path;

use crate::listing;
use crate::resolve::{Root, Target};

/// Serving a compressed copy saves this many header bytes less than the
/// raw size difference suggests (`Content-Encoding` line); a compressed
/// copy is kept only when it still wins after the overhead.
const COMPRESSION_HEADER_OVERHEAD: usize = 32;

/// Errors from artifact construction.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Resolution failed: missing file, unreadable path, or escape.
    #[error("not found")]
    NotFound,

    /// The target resolved but could not be read or rendered.
    #[error("failed to build artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Payload representation, fixed at construction.
#[derive(Debug)]
pub enum Variant {
    /// In-memory contents, plus a deflate copy when it beats the raw
    /// bytes by more than the header overhead.
    Small {
        uncompressed: Vec<u8>,
        compressed: Option<Vec<u8>>,
    },
    /// Root-relative filename and size for streamed transmission.
    Large { rel: PathBuf, size: u64 },
    /// Pre-rendered directory listing.
    Listing { html: Vec<u8> },
}

/// One cached response artifact.
#[derive(Debug)]
pub struct Artifact {
    last_modified_http: String,
    last_modified_unix: i64,
    mime: &'static str,
    variant: Variant,
}

impl Artifact {
    /// `Last-Modified` value, pre-formatted at construction.
    pub fn last_modified_http(&self) -> &str {
        &self.last_modified_http
    }

    /// Modification time as epoch seconds, for `If-Modified-Since`
    /// comparison.
    pub fn last_modified_unix(&self) -> i64 {
        self.last_modified_unix
    }

    /// `Content-Type` value.
    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// Payload representation.
    pub fn variant(&self) -> &Variant {
        &self.variant
    }
}

/// Resolve `rel` under `root` and build its artifact.
pub fn build_artifact(root: &Root, rel: &str) -> Result<Artifact, ArtifactError> {
    let target = root.resolve(rel).ok_or(ArtifactError::NotFound)?;
    let (mime, mtime, variant) = match target {
        Target::Small { path, mtime, .. } => {
            let contents = std::fs::read(&path)?;
            let compressed = deflate_if_worthwhile(&contents);
            (
                mime_for_path(&path),
                mtime,
                Variant::Small {
                    uncompressed: contents,
                    compressed,
                },
            )
        }
        Target::Large {
            path,
            rel,
            size,
            mtime,
        } => (mime_for_path(&path), mtime, Variant::Large { rel, size }),
        Target::Dir { path, mtime } => {
            let html = listing::render(&path, rel)?;
            ("text/html", mtime, Variant::Listing { html })
        }
    };

    Ok(Artifact {
        last_modified_http: http_date(mtime),
        last_modified_unix: mtime,
        mime,
        variant,
    })
}

/// Deflate-compress `contents`, keeping the result only when it is
/// strictly smaller than the original after header overhead.
fn deflate_if_worthwhile(contents: &[u8]) -> Option<Vec<u8>> {
    if contents.is_empty() {
        return None;
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(contents).is_err() {
        return None;
    }
    let compressed = match encoder.finish() {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "deflate failed, serving uncompressed only");
            return None;
        }
    };
    if compressed.len() + COMPRESSION_HEADER_OVERHEAD < contents.len() {
        Some(compressed)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
