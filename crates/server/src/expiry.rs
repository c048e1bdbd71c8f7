// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity expiration queue for idle-connection reaping.
//!
//! Connections enter in arrival order and deadlines are always
//! `push time + keep_alive`, so the head expires no later than the tail
//! and reaping is O(expired) per tick. Connections that die early are
//! not removed mid-queue; their slots are marked dead and skipped when
//! they surface at the head.

use std::time::Duration;

/// What the owner knows about a queued connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// The connection already died in place; drop the entry silently.
    Dead,
    /// Still alive, due to be reaped once logical time passes this tick.
    Expires(u64),
}

/// Ring buffer of connection ids ordered by insertion time.
#[derive(Debug)]
pub struct ExpiryQueue {
    ring: Vec<u32>,
    first: usize,
    population: usize,
    /// Logical time, one tick per second of wall time.
    time: u64,
}

impl ExpiryQueue {
    /// Queue with room for `capacity` connections.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: vec![0; capacity.max(1)],
            first: 0,
            population: 0,
            time: 0,
        }
    }

    /// Number of queued entries (dead ones included until skipped).
    pub fn population(&self) -> usize {
        self.population
    }

    /// True when no further connection can be admitted.
    pub fn is_full(&self) -> bool {
        self.population == self.ring.len()
    }

    /// Append a connection id. Returns false when the ring is full; the
    /// caller must refuse the connection in that case.
    pub fn push(&mut self, id: u32) -> bool {
        if self.is_full() {
            return false;
        }
        let at = (self.first + self.population) % self.ring.len();
        self.ring[at] = id;
        self.population += 1;
        true
    }

    /// Deadline for a connection pushed or refreshed now.
    pub fn deadline_after(&self, keep_alive_ticks: u64) -> u64 {
        self.time + keep_alive_ticks
    }

    /// Event-wait timeout: one tick while anything is queued, otherwise
    /// wait forever.
    pub fn suggested_timeout(&self) -> Option<Duration> {
        (self.population > 0).then(|| Duration::from_secs(1))
    }

    /// Advance logical time by one tick, then pop from the head while it
    /// holds dead entries or entries whose deadline has passed. Returns
    /// every popped id; the caller releases their slots and reaps the
    /// ones that were still alive.
    ///
    /// Stops at the first live entry with a future deadline: entries
    /// behind it cannot have earlier deadlines.
    pub fn tick_and_reap(&mut self, mut state_of: impl FnMut(u32) -> EntryState) -> Vec<u32> {
        self.time += 1;
        let mut popped = Vec::new();
        while self.population > 0 {
            let id = self.ring[self.first];
            match state_of(id) {
                EntryState::Dead => {
                    popped.push(id);
                    self.pop_front();
                }
                EntryState::Expires(deadline) if deadline <= self.time => {
                    popped.push(id);
                    self.pop_front();
                }
                EntryState::Expires(_) => break,
            }
        }
        popped
    }

    fn pop_front(&mut self) {
        self.first = (self.first + 1) % self.ring.len();
        self.population -= 1;
    }
}

#[cfg(test)]
#[path = "expiry_tests.rs"]
mod tests;
