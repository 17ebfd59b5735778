//! One-shot stop gate between control threads and the tunnel worker.
//!
//! [`StopSignal`] has two observable states, *open* and *released*. Any
//! thread may release it any number of times; only the first release after
//! [`StopSignal::arm`] wakes the single [`StopWaiter`]. The waiter blocks on a
//! `oneshot` receiver, so it must live on a plain `std::thread`, never inside
//! an async runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::warn;

/// Why a [`StopWaiter`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// `release()` was called.
    Released,
    /// The sending half vanished without a release (re-armed or dropped).
    /// Treated as a request to stop promptly.
    Abandoned,
}

/// Releasable one-shot gate.
#[derive(Debug)]
pub struct StopSignal {
    released: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl StopSignal {
    /// A gate with no waiter attached. Releasing it only flips the flag.
    pub fn new() -> Self {
        Self {
            released: AtomicBool::new(false),
            tx: Mutex::new(None),
        }
    }

    fn lock_tx(&self) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
        match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reset the gate to *open* and hand out the waiter for the next session.
    ///
    /// A waiter from a previous arm, if still alive, wakes with
    /// [`WakeReason::Abandoned`].
    pub fn arm(&self) -> StopWaiter {
        let (tx, rx) = oneshot::channel();
        let mut guard = self.lock_tx();
        self.released.store(false, Ordering::SeqCst);
        *guard = Some(tx);
        StopWaiter { rx }
    }

    /// Release the gate. Returns `true` only for the release that woke the waiter.
    pub fn release(&self) -> bool {
        let mut guard = self.lock_tx();
        self.released.store(true, Ordering::SeqCst);
        match guard.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Whether the gate is in the terminal *released* state.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of an armed [`StopSignal`]. Owned by the worker thread.
#[derive(Debug)]
pub struct StopWaiter {
    rx: oneshot::Receiver<()>,
}

impl StopWaiter {
    /// Block the current thread until the gate is released.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn wait(self) -> WakeReason {
        match self.rx.blocking_recv() {
            Ok(()) => WakeReason::Released,
            Err(_) => {
                warn!("Tunnel: stop signal abandoned, stopping");
                WakeReason::Abandoned
            }
        }
    }
}
