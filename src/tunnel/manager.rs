//! Tunnel lifecycle controller.
//!
//! [`TunnelManager`] is created once per hosting-service instance. `start()`
//! spawns a dedicated worker thread that brings the session up, parks on the
//! stop signal, then tears everything down and asks the host to exit:
//!
//! ```text
//! start() ──spawn──▶ worker: reset flags → starting event → clear homepages
//!                            → start accounting → [start_routing]
//!                            → start_tunneling(entries) → wait(stop signal)
//! signal_stop() ─release─▶   → stopping event → engine.stop() (blocking)
//!                            → stop accounting → stop_foreground → stop_self
//! on_destroy() ──join──▶ worker exited
//! ```
//!
//! Only the worker drives teardown. `signal_stop()` never talks to the
//! engine, so it is safe to call from UI code, engine callbacks, or signal
//! handlers.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{EngineError, ManagerError};
use crate::notification::NOTIFICATION_ID;
use crate::state::SessionInfo;
use crate::stats::StatsSnapshot;

use super::engine::{Engine, EngineCallbacks};
use super::entries::build_entry_list;
use super::handler::{Collaborators, TunnelCore};
use super::machine::ConnectionState;
use super::signal::{StopWaiter, WakeReason};

/// Owns the worker thread and the session lifecycle.
pub struct TunnelManager {
    core: Arc<TunnelCore>,
    engine: Arc<dyn Engine>,
    first_start: bool,
    worker: Option<JoinHandle<()>>,
}

impl TunnelManager {
    /// Wire up a manager. `make_engine` receives the callback handle the
    /// engine must report to.
    pub fn new<F>(config: Config, services: Collaborators, make_engine: F) -> Self
    where
        F: FnOnce(Arc<dyn EngineCallbacks>) -> Arc<dyn Engine>,
    {
        let core = Arc::new(TunnelCore::new(Arc::new(config), services));
        let engine = make_engine(core.clone());
        Self {
            core,
            engine,
            first_start: true,
            worker: None,
        }
    }

    /// Start the session. Only the first call on an instance has any effect;
    /// returns as soon as the worker thread is running.
    pub fn start(&mut self) -> Result<(), ManagerError> {
        if !self.first_start {
            return Ok(());
        }
        self.first_start = false;

        let host = &self.core.services.host;
        host.start_foreground(
            NOTIFICATION_ID,
            &self.core.notification(ConnectionState::Connecting, false),
        );
        self.core
            .services
            .diagnostics
            .info(format!("Client version {}", self.core.config.client.version));

        let waiter = self.core.stop_signal.arm();
        self.core.lock_flags().reset_session();

        let core = self.core.clone();
        let engine = self.engine.clone();
        let spawned = std::thread::Builder::new()
            .name("tunnel-worker".to_string())
            .spawn(move || run_tunnel(&core, engine.as_ref(), waiter));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("Tunnel: failed to spawn worker: {e}");
                host.stop_foreground(true);
                Err(ManagerError::SpawnWorker(e))
            }
        }
    }

    /// Release the stop signal. The worker wakes and tears the session down.
    pub fn signal_stop(&self) {
        self.core.signal_stop();
    }

    pub fn signalled_stop(&self) -> bool {
        self.core.signalled_stop()
    }

    /// Freeze presentation, stop the session if still running, and wait for
    /// the worker to exit. Blocks for as long as engine teardown takes.
    pub fn on_destroy(&mut self) {
        self.core.mark_destroyed();

        let Some(worker) = self.worker.take() else {
            return;
        };

        // Normally already signalled; if not, the join below waits for a
        // full engine stop.
        self.signal_stop();

        if worker.join().is_err() {
            error!("Tunnel: worker thread panicked");
        }
    }

    /// Current presentation state.
    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    pub fn session_info(&self) -> SessionInfo {
        self.core.session.snapshot()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.core.stats.snapshot()
    }

    /// The handle engine callbacks go through.
    pub fn callbacks(&self) -> Arc<dyn EngineCallbacks> {
        self.core.clone()
    }
}

impl Drop for TunnelManager {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.on_destroy();
        }
    }
}

/// The session procedure. Runs on the worker thread.
fn run_tunnel(core: &TunnelCore, engine: &dyn Engine, waiter: StopWaiter) {
    let session_id = Uuid::new_v4();
    let span = info_span!("tunnel", session = %session_id);
    let _enter = span.enter();

    let services = &core.services;
    core.lock_flags().reset_session();

    // An upgrade fetched by a previous session may still be waiting.
    services.upgrades.notify_upgrade();
    services.events.emit(|sink| sink.tunnel_starting());
    services.diagnostics.info("Starting tunnel".to_string());

    core.session.clear_homepages();
    core.stats.start_session();

    let run_vpn = core.config.tunnel.whole_device
        && services.host.routing_available()
        && services.host.supports_routing();
    core.set_whole_device(run_vpn);

    if let Err(e) = start_and_wait(core, engine, run_vpn, waiter) {
        services
            .diagnostics
            .error(format!("Failed to start tunnel: {e}"));
    }

    core.lock_flags().mark_stopping();
    services.diagnostics.info("Stopping tunnel".to_string());
    services.events.emit(|sink| sink.tunnel_stopping());

    engine.stop();
    core.stats.stop();
    services.diagnostics.info("Tunnel stopped".to_string());

    services.host.stop_foreground(true);
    services.host.stop_self();
}

/// Bring the engine up and park until stopped. An `Err` means the session
/// never started; teardown runs either way.
fn start_and_wait(
    core: &TunnelCore,
    engine: &dyn Engine,
    run_vpn: bool,
    waiter: StopWaiter,
) -> Result<(), EngineError> {
    if run_vpn {
        if !engine.start_routing() {
            return Err(EngineError::RoutingRefused);
        }
        core.services
            .diagnostics
            .info("VPN routing running".to_string());
    }

    let tunnel = &core.config.tunnel;
    let entries = build_entry_list(
        &core.config.client.embedded_server_entries,
        &tunnel.legacy_entries_path(),
        tunnel.max_legacy_entries,
    );
    info!("Tunnel: starting with {} server entries", entries.len());
    engine.start_tunneling(&entries.to_engine_string())?;

    if waiter.wait() == WakeReason::Released {
        info!("Tunnel: woke on stop signal");
    }
    Ok(())
}
