// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server lifecycle: startup, the accept/dispatch loop, shutdown.
//!
//! Startup pins the serving root and binds the listen socket; both are
//! fatal on failure. Shutdown closes the dispatch channels, which makes
//! every worker's receive loop end, then joins the worker threads.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use loft_cache::{Cache, Root};
use loft_core::ServerConfig;

use crate::worker::{Shared, Worker};

/// How long a cached artifact stays fresh.
const CACHE_TTL: Duration = Duration::from_secs(5);

/// Per-worker dispatch queue depth; acceptor skips to the next worker
/// when one is saturated.
const DISPATCH_DEPTH: usize = 128;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot open root directory: {0}")]
    Root(#[source] std::io::Error),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

struct WorkerHandle {
    tx: mpsc::Sender<std::net::TcpStream>,
    thread: std::thread::JoinHandle<()>,
}

/// A bound server with its workers running, ready to accept.
pub struct Server {
    listener: TcpListener,
    workers: Vec<WorkerHandle>,
    shutdown: Arc<Notify>,
    next: usize,
}

impl Server {
    /// Validate the root, bind the socket, spawn the worker threads.
    pub async fn startup(config: &ServerConfig) -> Result<Self, LifecycleError> {
        let root =
            Root::open(&config.root_path, &config.index_html).map_err(LifecycleError::Root)?;
        info!(root = %root.dir().display(), "pinned serving root");

        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| LifecycleError::Bind {
                addr: config.listen,
                source,
            })?;

        let shared = Arc::new(Shared {
            root,
            cache: Cache::new(CACHE_TTL),
        });

        let mut workers = Vec::with_capacity(config.threads.count);
        for id in 0..config.threads.count {
            let (tx, rx) = mpsc::channel(DISPATCH_DEPTH);
            let worker = Worker {
                id,
                max_conns: config.threads.max_fd,
                keep_alive_ticks: config.keep_alive_timeout,
                rx,
                shared: Arc::clone(&shared),
            };
            let thread = worker.spawn().map_err(LifecycleError::WorkerSpawn)?;
            workers.push(WorkerHandle { tx, thread });
        }

        info!(
            workers = workers.len(),
            addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            "listening"
        );

        Ok(Self {
            listener,
            workers,
            shutdown: Arc::new(Notify::new()),
            next: 0,
        })
    }

    /// The bound address (useful with an ephemeral port).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle that makes [`Server::run`] return.
    pub fn shutdown_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Accept and dispatch until shutdown is requested, then tear the
    /// workers down and join them.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => self.dispatch(stream),
                    Err(e) => {
                        // Transient accept failures (peer reset mid
                        // handshake, fd pressure) do not stop the loop
                        error!(error = %e, "accept failed");
                    }
                }
            }
        }

        drop(self.listener);
        for handle in self.workers {
            drop(handle.tx);
            if handle.thread.join().is_err() {
                error!("worker thread panicked");
            }
        }
        info!("all workers stopped");
    }

    /// Hand an accepted socket to the next worker, round-robin. Skips
    /// saturated or dead workers; with every queue full the socket is
    /// dropped, refusing the connection.
    fn dispatch(&mut self, stream: tokio::net::TcpStream) {
        let _ = stream.set_nodelay(true);
        let stream = match stream.into_std() {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "failed to detach accepted socket");
                return;
            }
        };

        let count = self.workers.len();
        let mut pending = stream;
        for attempt in 0..count {
            let target = (self.next + attempt) % count;
            match self.workers[target].tx.try_send(pending) {
                Ok(()) => {
                    self.next = (target + 1) % count;
                    return;
                }
                Err(mpsc::error::TrySendError::Full(s))
                | Err(mpsc::error::TrySendError::Closed(s)) => pending = s,
            }
        }
        debug!("every worker at capacity, refusing connection");
    }
}
