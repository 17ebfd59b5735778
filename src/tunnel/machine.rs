//! Connection state machine and the per-session flag bundle it runs on.
//!
//! All transitions go through [`SessionFlags`], which the manager keeps behind
//! a single mutex. Every method here is a short, non-blocking mutation; the
//! caller acts on the returned step (notification, events) after dropping
//! the lock.

use serde::Serialize;

/// Presentation state of the tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
}

/// A state change that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl Transition {
    /// A transition deserves a user-facing alert only when the state changed.
    #[must_use]
    pub fn is_alert(&self) -> bool {
        self.from != self.to
    }
}

/// Result of applying a *connecting* event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectingStep {
    pub transition: Transition,
    /// The session had connected before, so this is a user-visible disruption.
    pub unexpected_disconnect: bool,
}

/// Result of applying a *connected* event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectedStep {
    pub transition: Transition,
    /// Value of the reconnect flag before this event.
    pub is_reconnect: bool,
}

/// Shared mutable session flags.
#[derive(Debug, Default)]
pub struct SessionFlags {
    state: ConnectionState,
    stopping: bool,
    reconnect: bool,
    destroyed: bool,
    last_upstream_proxy_error: Option<String>,
}

impl SessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-session fields at the top of a run. `destroyed` survives.
    pub fn reset_session(&mut self) {
        self.state = ConnectionState::Connecting;
        self.stopping = false;
        self.reconnect = false;
        self.last_upstream_proxy_error = None;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn is_reconnect(&self) -> bool {
        self.reconnect
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn mark_stopping(&mut self) {
        self.stopping = true;
    }

    pub fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    fn transition_to(&mut self, to: ConnectionState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }

    /// Apply a *connecting* event. `None` means nothing may change: either
    /// a stop is in progress or the host is gone.
    pub fn on_connecting(&mut self) -> Option<ConnectingStep> {
        if self.destroyed || self.stopping {
            return None;
        }
        let transition = self.transition_to(ConnectionState::Connecting);
        Some(ConnectingStep {
            transition,
            unexpected_disconnect: self.reconnect,
        })
    }

    /// Apply a *connected* event. Only the first connected event in a session
    /// reports `is_reconnect == false`.
    pub fn on_connected(&mut self) -> Option<ConnectedStep> {
        if self.destroyed {
            return None;
        }
        let transition = self.transition_to(ConnectionState::Connected);
        let is_reconnect = self.reconnect;
        self.reconnect = true;
        Some(ConnectedStep {
            transition,
            is_reconnect,
        })
    }

    /// Record an upstream proxy error. Returns `true` if it differs from the
    /// last one and should be reported.
    pub fn note_upstream_proxy_error(&mut self, message: &str) -> bool {
        if self.destroyed || self.last_upstream_proxy_error.as_deref() == Some(message) {
            return false;
        }
        self.last_upstream_proxy_error = Some(message.to_string());
        true
    }
}
