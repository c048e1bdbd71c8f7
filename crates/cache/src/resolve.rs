// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-path resolution under the served root.
//!
//! The root is canonicalised once at startup; every resolution
//! re-canonicalises the joined path and requires the root as a prefix of
//! the result. That prefix check is the sole escape defence — symlinks,
//! `..` segments, and encoded traversals all collapse to it.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

/// Files strictly smaller than this are cached in memory (and considered
/// for compression); everything else is streamed from disk.
pub const SMALL_FILE_MAX: u64 = 16_384;

/// The served directory, pinned at startup.
#[derive(Debug, Clone)]
pub struct Root {
    dir: PathBuf,
    index: String,
}

/// A classified resolution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Regular file below [`SMALL_FILE_MAX`].
    Small { path: PathBuf, size: u64, mtime: i64 },
    /// Regular file served by streaming; `rel` is root-relative.
    Large {
        path: PathBuf,
        rel: PathBuf,
        size: u64,
        mtime: i64,
    },
    /// Directory without an index file; a listing is rendered.
    Dir { path: PathBuf, mtime: i64 },
}

impl Root {
    /// Pin `dir` as the served root. Fails unless it canonicalises to a
    /// directory.
    pub fn open(dir: &Path, index: &str) -> std::io::Result<Self> {
        let dir = std::fs::canonicalize(dir)?;
        if !std::fs::metadata(&dir)?.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("{} is not a directory", dir.display()),
            ));
        }
        Ok(Self {
            dir,
            index: index.to_string(),
        })
    }

    /// Canonical path of the root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a root-relative request path (leading slashes already
    /// stripped). `None` means the request is a 404: nonexistent target,
    /// unreadable path, or an escape attempt.
    pub fn resolve(&self, rel: &str) -> Option<Target> {
        let canonical = std::fs::canonicalize(self.dir.join(rel)).ok()?;
        if !canonical.starts_with(&self.dir) {
            debug!(path = rel, "rejected path escaping the root");
            return None;
        }
        self.classify(canonical, true)
    }

    /// Classify a canonical path. `follow_index` guards the one level of
    /// directory → index indirection.
    fn classify(&self, path: PathBuf, follow_index: bool) -> Option<Target> {
        let meta = std::fs::metadata(&path).ok()?;
        let mtime = mtime_epoch(&meta);

        if meta.is_dir() {
            if follow_index {
                let index_path = path.join(&self.index);
                if let Ok(index_meta) = std::fs::metadata(&index_path) {
                    if index_meta.is_file() {
                        return self.classify(index_path, false);
                    }
                }
            }
            return Some(Target::Dir { path, mtime });
        }

        if !meta.is_file() {
            return None;
        }

        let size = meta.len();
        if size < SMALL_FILE_MAX {
            Some(Target::Small { path, size, mtime })
        } else {
            let rel = path.strip_prefix(&self.dir).ok()?.to_path_buf();
            Some(Target::Large {
                path,
                rel,
                size,
                mtime,
            })
        }
    }
}

/// Modification time as epoch seconds; files predating the epoch clamp
/// to 0.
pub(crate) fn mtime_epoch(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
