// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker threads: one event loop per thread.
//!
//! Each worker runs a current-thread runtime with a `LocalSet`, so every
//! connection task it spawns stays pinned to it. Workers receive accepted
//! sockets over a dispatch channel and otherwise share nothing but the
//! content cache; slab, expiration queue, and header-date cache are
//! worker-local behind an `Rc<RefCell<..>>`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use loft_cache::{Artifact, Cache, Root};

use crate::conn::{self, ConnSlab, ConnSlot, ConnTask};
use crate::expiry::{EntryState, ExpiryQueue};
use crate::serve::Dates;

/// State shared by every worker: the pinned root and the content cache.
#[derive(Debug)]
pub(crate) struct Shared {
    pub root: Root,
    pub cache: Cache<Artifact>,
}

/// Worker-local mutable state, shared between the loop and its tasks.
#[derive(Debug)]
pub(crate) struct WorkerState {
    pub slab: ConnSlab,
    pub expiry: ExpiryQueue,
    pub dates: Dates,
    /// Keep-alive timeout in ticks (seconds).
    pub keep_alive_ticks: u64,
}

/// One worker, ready to be spawned onto its own OS thread.
pub(crate) struct Worker {
    pub id: usize,
    pub max_conns: usize,
    pub keep_alive_ticks: u64,
    pub rx: mpsc::Receiver<std::net::TcpStream>,
    pub shared: Arc<Shared>,
}

impl Worker {
    /// Spawn the worker thread. The thread exits when the dispatch
    /// channel closes; dropping its `LocalSet` cancels surviving
    /// connection tasks, which releases their sockets and cache leases.
    pub fn spawn(self) -> std::io::Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("loft-worker-{}", self.id))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(worker = self.id, error = %e, "failed to build worker runtime");
                        return;
                    }
                };
                let local = tokio::task::LocalSet::new();
                local.block_on(&runtime, self.run());
            })
    }

    async fn run(mut self) {
        let state = Rc::new(RefCell::new(WorkerState {
            slab: ConnSlab::new(self.max_conns),
            expiry: ExpiryQueue::new(self.max_conns),
            dates: Dates::now(),
            keep_alive_ticks: self.keep_alive_ticks,
        }));
        info!(worker = self.id, "worker ready");

        // Absolute tick deadline so a busy accept stream cannot starve
        // reaping; cleared while no connection is queued.
        let mut next_tick: Option<Instant> = None;

        loop {
            next_tick = match (state.borrow().expiry.suggested_timeout(), next_tick) {
                (None, _) => None,
                (Some(tick), None) => Some(Instant::now() + tick),
                (Some(_), pending) => pending,
            };

            tokio::select! {
                incoming = self.rx.recv() => match incoming {
                    Some(stream) => self.admit(stream, &state),
                    None => break,
                },
                _ = wait_until(next_tick) => {
                    Self::tick(&state);
                    next_tick = next_tick.map(|t| t + Duration::from_secs(1));
                }
            }
        }

        info!(worker = self.id, "worker stopped");
    }

    /// Take ownership of an accepted socket: claim a slab slot, enter the
    /// expiration queue, spawn the connection task. At capacity the
    /// socket is dropped, which refuses the connection.
    fn admit(&self, stream: std::net::TcpStream, state: &Rc<RefCell<WorkerState>>) {
        let mut st = state.borrow_mut();
        // Ticks pause while the queue is empty; catch the dates up
        st.dates.refresh();
        if st.slab.is_full() || st.expiry.is_full() {
            debug!(worker = self.id, "refusing connection: worker at capacity");
            return;
        }

        let stream = match TcpStream::from_std(stream) {
            Ok(s) => s,
            Err(e) => {
                debug!(worker = self.id, error = %e, "failed to register socket");
                return;
            }
        };
        let peer = match stream.peer_addr() {
            Ok(p) => p,
            Err(e) => {
                debug!(worker = self.id, error = %e, "peer vanished before admission");
                return;
            }
        };

        let time_to_die = st.expiry.deadline_after(st.keep_alive_ticks);
        let Some(id) = st.slab.insert(ConnSlot {
            remote_addr: peer,
            alive: true,
            time_to_die,
            task: None,
        }) else {
            return;
        };
        let _ = st.expiry.push(id); // capacity checked above
        drop(st);

        debug!(worker = self.id, conn = id, peer = %peer, "connection admitted");
        let handle = tokio::task::spawn_local(conn::drive(
            id,
            stream,
            peer,
            Rc::clone(state),
            Arc::clone(&self.shared),
        ));
        if let Some(slot) = state.borrow_mut().slab.get_mut(id) {
            slot.task = Some(ConnTask::new(handle));
        }
    }

    /// One logical tick: refresh the header-date cache, then pop and reap
    /// whatever the expiration queue surfaces.
    fn tick(state: &Rc<RefCell<WorkerState>>) {
        let mut st = state.borrow_mut();
        st.dates.refresh();

        let WorkerState { slab, expiry, .. } = &mut *st;
        let popped = expiry.tick_and_reap(|id| match slab.get(id) {
            Some(slot) if slot.alive => EntryState::Expires(slot.time_to_die),
            _ => EntryState::Dead,
        });

        for id in popped {
            let Some(slot) = slab.remove(id) else { continue };
            if slot.alive {
                debug!(conn = id, peer = %slot.remote_addr, "reaping idle connection");
            }
            // Freeing the task runs its cleanups; a no-op when the task
            // already returned
            if let Some(task) = slot.task {
                task.free();
            }
        }
    }
}

/// Sleep until the deadline, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending::<()>().await,
    }
}
