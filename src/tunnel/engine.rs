//! Narrow command/callback contract with the tunneling engine.
//!
//! The engine is a black box: the manager tells it to route, tunnel, and
//! stop, and the engine reports what happens through [`EngineCallbacks`],
//! from threads of its own choosing.

use std::sync::Arc;

use crate::error::EngineError;
use crate::host::HostService;

/// Commands the manager issues to the engine.
pub trait Engine: Send + Sync {
    /// Take over whole-device routing. `false` means the host refused
    /// (VPN permission not granted or revoked).
    fn start_routing(&self) -> bool;

    /// Start a tunnel session with the given newline-separated entry list.
    /// Returns once the session is running; progress arrives via callbacks.
    fn start_tunneling(&self, entries: &str) -> Result<(), EngineError>;

    /// Stop the session. Blocks until the engine has fully torn down.
    fn stop(&self);
}

/// Callback surface the engine calls into. Every method may run on any
/// thread, concurrently with the tunnel worker.
pub trait EngineCallbacks: Send + Sync {
    fn app_name(&self) -> String;

    /// The hosting service, for VPN setup.
    fn host(&self) -> Arc<dyn HostService>;

    /// JSON configuration document for the session.
    fn engine_config(&self) -> String;

    fn on_diagnostic_message(&self, message: &str);
    fn on_available_egress_regions(&self, regions: &[String]);
    fn on_socks_proxy_port_in_use(&self, port: u16);
    fn on_http_proxy_port_in_use(&self, port: u16);
    fn on_listening_socks_proxy_port(&self, port: u16);
    fn on_listening_http_proxy_port(&self, port: u16);
    fn on_upstream_proxy_error(&self, message: &str);
    fn on_connecting(&self);
    fn on_connected(&self);
    fn on_homepage(&self, url: &str);
    fn on_client_region(&self, region: &str);
    fn on_client_upgrade_downloaded(&self, filename: &str);
    fn on_split_tunnel_region(&self, region: &str);
    fn on_untunneled_address(&self, address: &str);
    fn on_bytes_transferred(&self, sent: u64, received: u64);
    fn on_started_waiting_for_network_connectivity(&self);
}

