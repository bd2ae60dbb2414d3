//! Message sink: retained message log plus the bounded display queue.
//!
//! Producers (listener thread, player dispatch) append formatted lines. The
//! display queue is bounded and drops the newest line when full; the
//! retained log keeps the most recent `log_capacity` persisted lines for
//! "save log".

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::log_format::{format_comment_line, local_time_of_day};

/// Screen-only diagnostic output, injected into components that report to the user.
pub trait Diagnostics: Send + Sync {
    /// Show `text` to the user without adding it to the saved log.
    fn screen(&self, text: &str);
}

/// Thread-safe append-only message log with a bounded display feed.
pub struct MessageSink {
    display_tx: Sender<String>,
    display_rx: Receiver<String>,
    log: Mutex<VecDeque<String>>,
    log_capacity: usize,
    dropped: AtomicU64,
}

impl MessageSink {
    pub fn new(queue_capacity: usize, log_capacity: usize) -> Self {
        let (display_tx, display_rx) = crossbeam_channel::bounded(queue_capacity.max(1));
        Self {
            display_tx,
            display_rx,
            log: Mutex::new(VecDeque::new()),
            log_capacity: log_capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a formatted line. Screen-only lines skip the retained log.
    pub fn append(&self, text: String, screen_only: bool) {
        if !screen_only {
            if let Ok(mut log) = self.log.lock() {
                log.push_back(text.clone());
                while log.len() > self.log_capacity {
                    log.pop_front();
                }
            }
        }

        match self.display_tx.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(line)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(target: "sink", "display queue full, dropping: {}", line);
            }
            // we hold the receiver ourselves, so this only happens mid-drop
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Receiver for the display feed. Clones share the same queue.
    pub fn display_receiver(&self) -> Receiver<String> {
        self.display_rx.clone()
    }

    /// Take everything currently waiting for display.
    pub fn drain_display(&self) -> Vec<String> {
        self.display_rx.try_iter().collect()
    }

    /// Snapshot of the retained (persisted) lines, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.log
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }

    /// Lines dropped because the display queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Write the retained log to `path`, one line per message.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let lines = self.messages();
        let mut writer = BufWriter::new(File::create(path)?);
        for line in &lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        log::info!(target: "sink", "saved {} lines to {}", lines.len(), path.display());
        Ok(())
    }
}

impl Diagnostics for MessageSink {
    fn screen(&self, text: &str) {
        self.append(format_comment_line(local_time_of_day(), text), true);
    }
}
