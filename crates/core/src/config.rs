// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server configuration: TOML file plus `LOFT_*` environment overrides.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("root_path is required (config file or LOFT_ROOT)")]
    MissingRoot,

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Worker thread settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadsConfig {
    /// Number of worker threads.
    pub count: usize,
    /// Per-worker connection slab capacity.
    pub max_fd: usize,
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory to serve.
    pub root_path: PathBuf,
    /// Index file probed when a directory is requested.
    pub index_html: String,
    /// Idle keep-alive timeout in seconds.
    pub keep_alive_timeout: u64,
    /// Address to bind.
    pub listen: SocketAddr,
    /// Worker thread settings.
    pub threads: ThreadsConfig,
}

/// On-disk configuration shape; every key optional so partial files work.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    root_path: Option<PathBuf>,
    index_html: Option<String>,
    keep_alive_timeout: Option<u64>,
    listen: Option<String>,
    threads: Option<RawThreads>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawThreads {
    count: Option<usize>,
    max_fd: Option<usize>,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file, then apply `LOFT_*`
    /// environment overrides and defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let raw = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                    path: p.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: p.to_path_buf(),
                    source,
                })?
            }
            None => RawConfig::default(),
        };

        Self::resolve(raw, |key| std::env::var(key).ok())
    }

    /// Resolve a raw config with an injectable environment lookup.
    fn resolve(
        mut raw: RawConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(root) = env("LOFT_ROOT") {
            raw.root_path = Some(PathBuf::from(root));
        }
        if let Some(index) = env("LOFT_INDEX_HTML") {
            raw.index_html = Some(index);
        }
        if let Some(timeout) = env("LOFT_KEEP_ALIVE_TIMEOUT") {
            raw.keep_alive_timeout = Some(parse_env("LOFT_KEEP_ALIVE_TIMEOUT", &timeout)?);
        }
        if let Some(listen) = env("LOFT_LISTEN") {
            raw.listen = Some(listen);
        }
        let threads = raw.threads.get_or_insert_with(RawThreads::default);
        if let Some(count) = env("LOFT_THREADS") {
            threads.count = Some(parse_env("LOFT_THREADS", &count)?);
        }
        if let Some(max_fd) = env("LOFT_MAX_FD") {
            threads.max_fd = Some(parse_env("LOFT_MAX_FD", &max_fd)?);
        }

        let root_path = raw.root_path.ok_or(ConfigError::MissingRoot)?;

        let listen = raw
            .listen
            .as_deref()
            .unwrap_or("127.0.0.1:8080")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "listen",
                reason: e.to_string(),
            })?;

        let threads = raw.threads.unwrap_or_default();
        let config = Self {
            root_path,
            index_html: raw.index_html.unwrap_or_else(|| "index.html".to_string()),
            keep_alive_timeout: raw.keep_alive_timeout.unwrap_or(15),
            listen,
            threads: ThreadsConfig {
                count: threads.count.unwrap_or_else(default_thread_count),
                max_fd: threads.max_fd.unwrap_or(1024),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_alive_timeout == 0 {
            return Err(ConfigError::Invalid {
                key: "keep_alive_timeout",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.threads.count == 0 {
            return Err(ConfigError::Invalid {
                key: "threads.count",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.threads.max_fd < 8 {
            return Err(ConfigError::Invalid {
                key: "threads.max_fd",
                reason: "must be at least 8".to_string(),
            });
        }
        Ok(())
    }
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(2)
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
