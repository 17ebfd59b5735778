//! Session data published for UI consumption.
//!
//! Written by engine callbacks, read by whoever presents the tunnel (status
//! pages, the CLI). Everything here is cleared or overwritten per session.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// Snapshot of what the engine has announced so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Homepages announced by the network, in arrival order, no duplicates.
    pub homepages: Vec<String>,
    /// Region the network resolved this client to.
    pub client_region: Option<String>,
    /// Bound local SOCKS proxy port.
    pub socks_proxy_port: Option<u16>,
    /// Bound local HTTP proxy port.
    pub http_proxy_port: Option<u16>,
}

/// Shared, mutex-guarded [`SessionInfo`].
#[derive(Debug, Default)]
pub struct SessionData {
    inner: Mutex<SessionInfo>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionInfo> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn clear_homepages(&self) {
        self.lock().homepages.clear();
    }

    pub fn add_homepage(&self, url: &str) {
        let mut info = self.lock();
        if !info.homepages.iter().any(|h| h == url) {
            info.homepages.push(url.to_string());
        }
    }

    pub fn set_client_region(&self, region: &str) {
        self.lock().client_region = Some(region.to_string());
    }

    pub fn set_socks_proxy_port(&self, port: u16) {
        self.lock().socks_proxy_port = Some(port);
    }

    pub fn set_http_proxy_port(&self, port: u16) {
        self.lock().http_proxy_port = Some(port);
    }

    pub fn snapshot(&self) -> SessionInfo {
        self.lock().clone()
    }
}
