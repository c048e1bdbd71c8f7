// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection records and the connection task.
//!
//! Each accepted connection gets one slab slot and one cooperative task
//! spawned on the owning worker's `LocalSet`. The task is `!Send`, so it
//! can only ever be driven by the worker that created it. Freeing a task
//! (abort) runs its drop guards — open sockets and cache leases — in
//! reverse order, whether the task finished or was cancelled mid-I/O.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;

use loft_http::{parse_request, ParseError, ParseOutcome};

use crate::serve;
use crate::worker::{Shared, WorkerState};

/// Initial read-buffer capacity; grows up to the request-head cap.
const READ_BUF_SIZE: usize = 1024;

/// Handle to a connection's task, owned by its slab slot.
#[derive(Debug)]
pub(crate) struct ConnTask {
    handle: JoinHandle<()>,
}

impl ConnTask {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Cancel the task. Its drop guards run at the next yield point; a
    /// task that already returned is unaffected.
    pub fn free(&self) {
        self.handle.abort();
    }
}

/// One slab slot; lives from admit until the expiration queue pops it.
#[derive(Debug)]
pub(crate) struct ConnSlot {
    pub remote_addr: SocketAddr,
    /// Cleared in place on EOF/peer error; the expiration queue skips
    /// dead slots lazily.
    pub alive: bool,
    /// Logical tick at which an idle connection is reaped.
    pub time_to_die: u64,
    pub task: Option<ConnTask>,
}

/// Pre-allocated connection slot table, indexed by connection id.
#[derive(Debug)]
pub(crate) struct ConnSlab {
    slots: Vec<Option<ConnSlot>>,
    free: Vec<u32>,
}

impl ConnSlab {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        // Pop order matches ascending ids
        let free = (0..capacity as u32).rev().collect();
        Self { slots, free }
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Claim a slot, returning its id.
    pub fn insert(&mut self, slot: ConnSlot) -> Option<u32> {
        let id = self.free.pop()?;
        self.slots[id as usize] = Some(slot);
        Some(id)
    }

    pub fn get(&self, id: u32) -> Option<&ConnSlot> {
        self.slots.get(id as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut ConnSlot> {
        self.slots.get_mut(id as usize).and_then(|s| s.as_mut())
    }

    /// Release a slot for reuse.
    pub fn remove(&mut self, id: u32) -> Option<ConnSlot> {
        let slot = self.slots.get_mut(id as usize).and_then(|s| s.take())?;
        self.free.push(id);
        Some(slot)
    }
}

/// Entry point of a connection task: serve requests until the peer is
/// done, then mark the slot dead in place.
pub(crate) async fn drive(
    id: u32,
    stream: TcpStream,
    peer: SocketAddr,
    state: Rc<RefCell<WorkerState>>,
    shared: Arc<Shared>,
) {
    if let Err(e) = serve_loop(id, stream, &state, &shared).await {
        // Peer-level failures are noise; log them only at debug
        debug!(conn = id, peer = %peer, error = %e, "connection ended with error");
    }
    if let Some(slot) = state.borrow_mut().slab.get_mut(id) {
        slot.alive = false;
    }
}

async fn serve_loop(
    id: u32,
    mut stream: TcpStream,
    state: &Rc<RefCell<WorkerState>>,
    shared: &Arc<Shared>,
) -> std::io::Result<()> {
    let mut read_buf = BytesMut::with_capacity(READ_BUF_SIZE);
    let mut out_buf: Vec<u8> = Vec::with_capacity(READ_BUF_SIZE);

    loop {
        // Accumulate bytes until one full request head is buffered.
        // Pipelined requests already sitting in the buffer parse without
        // touching the socket.
        let request = loop {
            match parse_request(&read_buf) {
                Ok(ParseOutcome::Complete { request, consumed }) => {
                    read_buf.advance(consumed);
                    break request;
                }
                Ok(ParseOutcome::Partial) => {
                    if stream.read_buf(&mut read_buf).await? == 0 {
                        return Ok(()); // EOF between requests
                    }
                }
                Err(ParseError::UnsupportedMethod(method)) => {
                    debug!(conn = id, method, "unsupported method");
                    serve::method_not_allowed(&mut stream, &mut out_buf, &dates(state)).await?;
                    return Ok(());
                }
                Err(e) => {
                    debug!(conn = id, error = %e, "dropping malformed connection");
                    return Ok(());
                }
            }
        };

        let keep_alive =
            serve::serve_request(&mut stream, &mut out_buf, &request, shared, &dates(state))
                .await?;

        // Service done: re-arm the idle deadline in place
        {
            let mut st = state.borrow_mut();
            let deadline = st.expiry.deadline_after(st.keep_alive_ticks);
            if let Some(slot) = st.slab.get_mut(id) {
                slot.time_to_die = deadline;
            }
        }

        if !keep_alive {
            return Ok(());
        }
    }
}

/// Snapshot the worker's cached header dates without holding the borrow
/// across an await.
fn dates(state: &Rc<RefCell<WorkerState>>) -> serve::Dates {
    state.borrow().dates.clone()
}
