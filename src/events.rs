//! Tunnel lifecycle events for an optional UI listener.
//!
//! A UI registers an [`EventSink`] in the [`EventSinkSlot`] while it is
//! showing, and unregisters when it goes away. Emitting with nobody
//! registered is not an error; the call is skipped. The slot hands out a
//! clone of the sink and drops its lock before calling into it.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Receiver of tunnel lifecycle events.
pub trait EventSink: Send + Sync {
    fn tunnel_starting(&self);
    fn tunnel_stopping(&self);
    /// The tunnel dropped after having connected at least once this session.
    fn unexpected_disconnect(&self);
    fn handshake_success(&self, is_reconnect: bool);
}

/// Holder for the currently registered sink, if any.
#[derive(Default)]
pub struct EventSinkSlot {
    current: Mutex<Option<Arc<dyn EventSink>>>,
}

impl std::fmt::Debug for EventSinkSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSinkSlot")
            .field("registered", &self.current().is_some())
            .finish()
    }
}

impl EventSinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn EventSink>>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `sink`, replacing any previous one.
    pub fn register(&self, sink: Arc<dyn EventSink>) {
        *self.lock() = Some(sink);
    }

    pub fn unregister(&self) {
        *self.lock() = None;
    }

    /// The registered sink, cloned out so the caller holds no lock.
    pub fn current(&self) -> Option<Arc<dyn EventSink>> {
        self.lock().clone()
    }

    /// Run `f` against the registered sink, if any.
    pub fn emit(&self, f: impl FnOnce(&dyn EventSink)) {
        if let Some(sink) = self.current() {
            f(sink.as_ref());
        }
    }
}

/// [`EventSink`] that forwards events as JSON on a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEvents {
    tx: broadcast::Sender<Value>,
}

impl BroadcastEvents {
    pub fn new(tx: broadcast::Sender<Value>) -> Self {
        Self { tx }
    }

    fn send(&self, value: Value) {
        // No receivers is fine.
        let _ = self.tx.send(value);
    }
}

impl EventSink for BroadcastEvents {
    fn tunnel_starting(&self) {
        self.send(json!({ "type": "tunnel.starting" }));
    }

    fn tunnel_stopping(&self) {
        self.send(json!({ "type": "tunnel.stopping" }));
    }

    fn unexpected_disconnect(&self) {
        self.send(json!({ "type": "tunnel.unexpected_disconnect" }));
    }

    fn handshake_success(&self, is_reconnect: bool) {
        self.send(json!({
            "type": "tunnel.handshake_success",
            "is_reconnect": is_reconnect,
        }));
    }
}
