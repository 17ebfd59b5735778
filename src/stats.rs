//! Data-transfer accounting for one tunnel session.
//!
//! Byte counters are atomics so engine threads can add to them without
//! locking. Timing (session start, connected time) sits behind a mutex and is
//! only touched on state changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Default)]
struct Timing {
    session_started: Option<Instant>,
    connected_since: Option<Instant>,
    connected_total: Duration,
}

/// Byte and connected-time counters for the current session.
#[derive(Debug, Default)]
pub struct DataTransferStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    timing: Mutex<Timing>,
}

/// Point-in-time copy of [`DataTransferStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub active: bool,
    pub connected: bool,
    pub connected_ms: u64,
}

impl DataTransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_timing(&self) -> MutexGuard<'_, Timing> {
        match self.timing.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Begin a new accounting session, zeroing all counters.
    pub fn start_session(&self) {
        let mut timing = self.lock_timing();
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        *timing = Timing {
            session_started: Some(Instant::now()),
            ..Timing::default()
        };
    }

    /// The tunnel came up; start counting connected time.
    pub fn start_connected(&self) {
        let mut timing = self.lock_timing();
        if timing.session_started.is_some() && timing.connected_since.is_none() {
            timing.connected_since = Some(Instant::now());
        }
    }

    /// The tunnel went down; fold the running interval into the total.
    pub fn stop_connected(&self) {
        let mut timing = self.lock_timing();
        if let Some(since) = timing.connected_since.take() {
            timing.connected_total += since.elapsed();
        }
    }

    /// End the accounting session. Counters stay readable.
    pub fn stop(&self) {
        self.stop_connected();
        self.lock_timing().session_started = None;
    }

    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let timing = self.lock_timing();
        let running = timing
            .connected_since
            .map_or(Duration::ZERO, |since| since.elapsed());
        #[allow(clippy::cast_possible_truncation)]
        let connected_ms = (timing.connected_total + running).as_millis() as u64;
        StatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            active: timing.session_started.is_some(),
            connected: timing.connected_since.is_some(),
            connected_ms,
        }
    }
}
