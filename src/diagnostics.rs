//! In-memory diagnostic journal with real-time broadcast.
//!
//! Collects the user-visible record of a tunnel session: status lines,
//! reported errors, and raw engine diagnostics. Each new entry is broadcast
//! as a `diagnostic.new` JSON message so a status screen can follow along.
//!
//! The journal keeps only the most recent session history; once `max_entries`
//! is reached the oldest line makes room for the newest. Entry IDs never
//! repeat, so a screen that reconnects can fetch what it missed with
//! [`DiagnosticLog::read_since`]. Every entry is also written to tracing at
//! the matching level. The API is synchronous because the tunnel worker and
//! engine threads run outside any async runtime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    /// Raw engine chatter, not shown to users by default.
    Diagnostic,
    Info,
    Error,
}

/// A single journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub id: u64,
    pub timestamp: u64,
    pub level: DiagnosticLevel,
    pub message: String,
}

/// Ring buffer of diagnostic entries with broadcast support.
#[derive(Debug)]
pub struct DiagnosticLog {
    entries: Mutex<VecDeque<DiagnosticEntry>>,
    next_id: AtomicU64,
    max_entries: usize,
    broadcast_tx: broadcast::Sender<Value>,
}

impl DiagnosticLog {
    /// Create a log that broadcasts via the given channel.
    pub fn new(max_entries: usize, broadcast_tx: broadcast::Sender<Value>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(256))),
            next_id: AtomicU64::new(1),
            max_entries,
            broadcast_tx,
        }
    }

    /// Create a log with its own channel and nobody listening yet.
    pub fn detached(max_entries: usize) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self::new(max_entries, tx)
    }

    /// Subscribe to new entries.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.broadcast_tx.subscribe()
    }

    fn lock_entries(&self) -> MutexGuard<'_, VecDeque<DiagnosticEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append an entry, broadcast it, and return the assigned ID.
    pub fn log(&self, level: DiagnosticLevel, message: String) -> u64 {
        match level {
            DiagnosticLevel::Diagnostic => debug!(target: "tunhost::engine", "{message}"),
            DiagnosticLevel::Info => info!("{message}"),
            DiagnosticLevel::Error => error!("{message}"),
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let entry = DiagnosticEntry {
            id,
            timestamp,
            level,
            message,
        };

        let _ = self.broadcast_tx.send(json!({
            "type": "diagnostic.new",
            "entry": &entry,
        }));

        let mut entries = self.lock_entries();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);

        id
    }

    pub fn info(&self, message: String) -> u64 {
        self.log(DiagnosticLevel::Info, message)
    }

    pub fn error(&self, message: String) -> u64 {
        self.log(DiagnosticLevel::Error, message)
    }

    pub fn diagnostic(&self, message: String) -> u64 {
        self.log(DiagnosticLevel::Diagnostic, message)
    }

    /// Read entries with `id > since_id`, up to `limit`.
    pub fn read_since(&self, since_id: u64, limit: usize) -> Vec<DiagnosticEntry> {
        self.lock_entries()
            .iter()
            .filter(|e| e.id > since_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// All retained entries at the given level, oldest first.
    pub fn by_level(&self, level: DiagnosticLevel) -> Vec<DiagnosticEntry> {
        self.lock_entries()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }
}
