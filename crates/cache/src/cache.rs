// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared TTL cache with a non-blocking miss path.
//!
//! Entries are handed out as [`Lease`]s (shared references); an entry is
//! destroyed when it is no longer in the map and its last lease drops.
//! Eviction is lazy: a stale entry is removed by the next lookup that
//! touches its key, and survives until every outstanding lease is gone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

/// One cached value plus its bookkeeping.
#[derive(Debug)]
struct Entry<V> {
    value: V,
    /// Instant past which lookups treat the entry as stale.
    expires_at: Instant,
    /// Built outside the map under write contention; never visible to
    /// other lookups.
    floating: bool,
}

/// A reference to a cache entry, released on drop.
#[derive(Debug)]
pub struct Lease<V> {
    entry: Arc<Entry<V>>,
}

impl<V> Lease<V> {
    /// True when the entry was built outside the map (write contention).
    pub fn is_floating(&self) -> bool {
        self.entry.floating
    }
}

impl<V> std::ops::Deref for Lease<V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.entry.value
    }
}

impl<V> Clone for Lease<V> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

/// Concurrent map from string key to value, with per-entry TTL.
#[derive(Debug)]
pub struct Cache<V> {
    map: RwLock<HashMap<String, Arc<Entry<V>>>>,
    ttl: Duration,
}

impl<V> Cache<V> {
    /// Create an empty cache whose entries stay fresh for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fast-path lookup: a fresh hit or nothing. Never builds and never
    /// blocks; `None` covers a miss, a stale entry, and a contended lock
    /// alike.
    pub fn get(&self, key: &str, now: Instant) -> Option<Lease<V>> {
        let map = self.map.try_read()?;
        let entry = map.get(key)?;
        (entry.expires_at > now).then(|| Lease {
            entry: Arc::clone(entry),
        })
    }

    /// Look up `key`, building and inserting the value on a miss.
    ///
    /// Never blocks on the lock: the fresh-hit path is [`Cache::get`],
    /// the miss path inserts under `try_write`, and whenever a writer is
    /// in the way the value is built as a floating entry owned solely by
    /// the returned lease, keeping lookup latency bounded at the cost of
    /// duplicate build work. Racing builders are resolved by a re-check
    /// under the exclusive lock: losers reuse the winner's entry and
    /// their build never runs.
    pub fn lookup<E>(
        &self,
        key: &str,
        now: Instant,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<Lease<V>, E> {
        if let Some(lease) = self.get(key, now) {
            return Ok(lease);
        }

        let Some(mut map) = self.map.try_write() else {
            return Self::build_floating(key, now, build);
        };

        // Re-check: another writer may have raced the insert between our
        // shared-lock miss and acquiring the exclusive lock.
        if let Some(entry) = map.get(key) {
            if entry.expires_at > now {
                return Ok(Lease {
                    entry: Arc::clone(entry),
                });
            }
            map.remove(key);
        }

        let value = build()?;
        let entry = Arc::new(Entry {
            value,
            expires_at: now + self.ttl,
            floating: false,
        });
        map.insert(key.to_string(), Arc::clone(&entry));
        Ok(Lease { entry })
    }

    /// Contention fallback: build outside the map, visible only to this
    /// caller.
    fn build_floating<E>(
        key: &str,
        now: Instant,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<Lease<V>, E> {
        debug!(key, "cache lock contended, building floating entry");
        let value = build()?;
        Ok(Lease {
            entry: Arc::new(Entry {
                value,
                expires_at: now,
                floating: true,
            }),
        })
    }

    /// Drop every entry from the map. Outstanding leases keep their
    /// entries alive until released.
    pub fn purge(&self) {
        self.map.write().clear();
    }

    /// Number of entries currently in the map.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// True when the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        self.map.read().contains_key(key)
    }

    /// Test hook: hold the exclusive lock to force the contention path.
    #[cfg(test)]
    fn hold_write(&self) -> parking_lot::RwLockWriteGuard<'_, HashMap<String, Arc<Entry<V>>>> {
        self.map.write()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
