//! Projects the connection state into the host's persistent notification.

use serde::Serialize;

use crate::config::NotificationConfig;
use crate::tunnel::machine::ConnectionState;

/// ID the tunnel notification is always posted under.
pub const NOTIFICATION_ID: u32 = 1;

/// Rendering-agnostic notification content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub state: ConnectionState,
    pub title: String,
    pub text: String,
    /// Short text shown when the notification first appears.
    pub ticker: Option<String>,
    /// Play the alert sound.
    pub sound: bool,
    /// Vibrate.
    pub vibrate: bool,
}

impl Notification {
    /// Build the notification for `state`. Sound and vibration follow the
    /// user's preferences, and only when `alert` is set.
    pub fn for_state(
        state: ConnectionState,
        alert: bool,
        title: &str,
        whole_device: bool,
        prefs: &NotificationConfig,
    ) -> Self {
        let (text, ticker) = match state {
            ConnectionState::Connecting => {
                let text = "Connecting...".to_string();
                (text.clone(), Some(text))
            }
            ConnectionState::Connected if whole_device => {
                ("Tunneling whole device".to_string(), None)
            }
            ConnectionState::Connected => ("Tunneling proxy traffic".to_string(), None),
        };
        Self {
            state,
            title: title.to_string(),
            text,
            ticker,
            sound: alert && prefs.sound,
            vibrate: alert && prefs.vibrate,
        }
    }
}
