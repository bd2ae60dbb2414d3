//! Async forwarder: re-sends decoded messages from a single worker thread.
//!
//! `send` never blocks the caller: records go into a bounded queue and the
//! worker drains it, sending each through the transport. The worker polls
//! with a short timeout so `close` is honoured promptly. Send failures are
//! logged and the message dropped; nothing is retried.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use osc_console_types::MessageRecord;

use crate::transport::OscTransport;

/// Forwarding statistics, readable while the worker runs.
#[derive(Debug, Default)]
pub struct ForwarderStats {
    pub sent: AtomicU64,
    pub failed: AtomicU64,
    pub dropped: AtomicU64,
}

/// Cheap handle for enqueueing; cloned into the message router.
#[derive(Clone)]
pub struct ForwarderHandle {
    tx: Sender<MessageRecord>,
    running: Arc<AtomicBool>,
    stats: Arc<ForwarderStats>,
    dest: SocketAddr,
}

impl ForwarderHandle {
    /// Queue a message for forwarding. Drops it (with a log line) if the
    /// worker is gone or the queue is full.
    pub fn send(&self, record: MessageRecord) {
        if !self.running.load(Ordering::Acquire) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            log::error!(target: "forwarder", "forwarder not running, dropping {}", record.address);
            return;
        }
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(target: "forwarder", "forward queue full, dropping {}", record.address);
            }
            Err(TrySendError::Disconnected(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::error!(target: "forwarder", "forwarder worker gone, dropping {}", record.address);
            }
        }
    }

    pub fn destination(&self) -> SocketAddr {
        self.dest
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &ForwarderStats {
        &self.stats
    }
}

/// Owner of the forwarding worker thread.
pub struct AsyncForwarder {
    handle: ForwarderHandle,
    join_handle: Option<JoinHandle<()>>,
}

impl AsyncForwarder {
    /// Spawn the worker, forwarding to `dest` through `transport`.
    pub fn start(
        transport: Arc<dyn OscTransport>,
        dest: SocketAddr,
        queue_capacity: usize,
        poll_timeout: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<MessageRecord>(queue_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ForwarderStats::default());

        let worker_running = Arc::clone(&running);
        let worker_stats = Arc::clone(&stats);
        let join_handle = thread::Builder::new()
            .name("osc-forwarder".into())
            .spawn(move || {
                worker_loop(transport, dest, rx, worker_running, worker_stats, poll_timeout);
            })?;

        log::info!(target: "forwarder", "forwarding to {}", dest);

        Ok(Self {
            handle: ForwarderHandle {
                tx,
                running,
                stats,
                dest,
            },
            join_handle: Some(join_handle),
        })
    }

    pub fn handle(&self) -> ForwarderHandle {
        self.handle.clone()
    }

    pub fn send(&self, record: MessageRecord) {
        self.handle.send(record);
    }

    /// Stop the worker and wait for it. Queued messages are discarded.
    pub fn close(&mut self) {
        self.handle.running.store(false, Ordering::Release);
        if let Some(join) = self.join_handle.take() {
            if join.join().is_err() {
                log::error!(target: "forwarder", "forwarder worker panicked");
            }
            log::info!(target: "forwarder", "forwarder to {} closed", self.handle.dest);
        }
    }
}

impl Drop for AsyncForwarder {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(
    transport: Arc<dyn OscTransport>,
    dest: SocketAddr,
    rx: Receiver<MessageRecord>,
    running: Arc<AtomicBool>,
    stats: Arc<ForwarderStats>,
    poll_timeout: Duration,
) {
    while running.load(Ordering::Acquire) {
        match rx.recv_timeout(poll_timeout) {
            Ok(record) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                match transport.send_to(dest, &record) {
                    Ok(()) => {
                        stats.sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        log::error!(target: "forwarder", "forwarding {} to {} failed: {}", record.address, dest, e);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
