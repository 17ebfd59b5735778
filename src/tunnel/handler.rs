//! Shared tunnel state and the callback surface the engine drives.
//!
//! [`TunnelCore`] is what engine threads hold. Each callback takes the flag
//! lock for one short mutation, releases it, and only then talks to the
//! host, the event sink, or the diagnostic log.
//!
//! Connection transitions additionally run under a presentation lock that
//! spans "apply, then notify the host", so the host always ends up showing
//! the state the machine is in. The event sink is never called under it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::config::Config;
use crate::diagnostics::DiagnosticLog;
use crate::events::EventSinkSlot;
use crate::host::{HostService, RegionRegistry, UpgradeInstaller};
use crate::notification::{Notification, NOTIFICATION_ID};
use crate::state::SessionData;
use crate::stats::DataTransferStats;

use super::engine::EngineCallbacks;
use super::engine_config::EngineConfig;
use super::machine::{ConnectionState, SessionFlags, Transition};
use super::signal::StopSignal;

/// External services a tunnel manager is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub host: Arc<dyn HostService>,
    pub regions: Arc<dyn RegionRegistry>,
    pub upgrades: Arc<dyn UpgradeInstaller>,
    pub events: Arc<EventSinkSlot>,
    pub diagnostics: Arc<DiagnosticLog>,
}

/// State shared between the manager, its worker thread, and engine threads.
pub struct TunnelCore {
    pub(crate) config: Arc<Config>,
    pub(crate) services: Collaborators,
    pub(crate) stats: DataTransferStats,
    pub(crate) session: SessionData,
    pub(crate) stop_signal: StopSignal,
    flags: Mutex<SessionFlags>,
    /// Orders host notifications with the transitions they render.
    presentation: Mutex<()>,
    signalled_stop: AtomicBool,
    /// Whole-device routing was chosen for the running session.
    whole_device: AtomicBool,
}

impl TunnelCore {
    pub fn new(config: Arc<Config>, services: Collaborators) -> Self {
        Self {
            config,
            services,
            stats: DataTransferStats::new(),
            session: SessionData::new(),
            stop_signal: StopSignal::new(),
            flags: Mutex::new(SessionFlags::new()),
            presentation: Mutex::new(()),
            signalled_stop: AtomicBool::new(false),
            whole_device: AtomicBool::new(false),
        }
    }

    pub(crate) fn lock_flags(&self) -> MutexGuard<'_, SessionFlags> {
        match self.flags.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_presentation(&self) -> MutexGuard<'_, ()> {
        match self.presentation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Freeze presentation. Waits for an in-flight transition to finish
    /// notifying the host, so nothing is shown after this returns.
    pub(crate) fn mark_destroyed(&self) {
        let _shown = self.lock_presentation();
        self.lock_flags().mark_destroyed();
    }

    /// Ask the worker to tear the session down. Non-blocking and idempotent;
    /// never touches the engine.
    pub fn signal_stop(&self) {
        self.signalled_stop.store(true, Ordering::SeqCst);
        if self.stop_signal.release() {
            info!("Tunnel: stop signalled");
        }
    }

    pub fn signalled_stop(&self) -> bool {
        self.signalled_stop.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock_flags().state()
    }

    pub(crate) fn set_whole_device(&self, whole_device: bool) {
        self.whole_device.store(whole_device, Ordering::Relaxed);
    }

    /// Build the notification for `state` as the host should show it.
    pub(crate) fn notification(&self, state: ConnectionState, alert: bool) -> Notification {
        Notification::for_state(
            state,
            alert,
            &self.services.host.app_name(),
            self.whole_device.load(Ordering::Relaxed),
            &self.config.notifications,
        )
    }

    /// Apply a state machine step and show the resulting state on the host.
    /// `None` from `apply` means the event changed nothing.
    fn present<S>(
        &self,
        apply: impl FnOnce(&mut SessionFlags) -> Option<S>,
        transition: impl FnOnce(&S) -> Transition,
    ) -> Option<S> {
        let _shown = self.lock_presentation();
        let step = apply(&mut *self.lock_flags())?;
        let transition = transition(&step);
        let notification = self.notification(transition.to, transition.is_alert());
        self.services.host.notify(NOTIFICATION_ID, &notification);
        Some(step)
    }

    /// Session data is frozen once the host has been destroyed.
    fn accepting_updates(&self) -> bool {
        !self.lock_flags().is_destroyed()
    }

    fn report_error(&self, message: String) {
        self.services.diagnostics.error(message);
    }
}

impl EngineCallbacks for TunnelCore {
    fn app_name(&self) -> String {
        self.services.host.app_name()
    }

    fn host(&self) -> Arc<dyn HostService> {
        Arc::clone(&self.services.host)
    }

    fn engine_config(&self) -> String {
        let config = EngineConfig::build(&self.config, self.services.upgrades.as_ref());
        info!("Tunnel: egress region {:?}", config.egress_region);
        config.to_json()
    }

    fn on_diagnostic_message(&self, message: &str) {
        self.services.diagnostics.diagnostic(message.to_string());
    }

    fn on_available_egress_regions(&self, regions: &[String]) {
        if !self.accepting_updates() {
            return;
        }
        for region in regions {
            self.services.regions.set_server_exists(region, true);
        }
    }

    fn on_socks_proxy_port_in_use(&self, port: u16) {
        self.report_error(format!("Local SOCKS proxy port {port} is in use"));
        self.signal_stop();
    }

    fn on_http_proxy_port_in_use(&self, port: u16) {
        self.report_error(format!("Local HTTP proxy port {port} is in use"));
        self.signal_stop();
    }

    fn on_listening_socks_proxy_port(&self, port: u16) {
        if !self.accepting_updates() {
            return;
        }
        self.services
            .diagnostics
            .info(format!("SOCKS proxy running on localhost:{port}"));
        self.session.set_socks_proxy_port(port);
    }

    fn on_listening_http_proxy_port(&self, port: u16) {
        if !self.accepting_updates() {
            return;
        }
        self.services
            .diagnostics
            .info(format!("HTTP proxy running on localhost:{port}"));
        self.session.set_http_proxy_port(port);
    }

    fn on_upstream_proxy_error(&self, message: &str) {
        // Report once per distinct message; the engine keeps retrying.
        let report = self.lock_flags().note_upstream_proxy_error(message);
        if report {
            self.report_error(format!("Upstream proxy error: {message}"));
        }
    }

    fn on_connecting(&self) {
        if !self.accepting_updates() {
            return;
        }
        // Connected time stops accruing even if a stop is already underway.
        self.stats.stop_connected();

        let Some(step) = self.present(SessionFlags::on_connecting, |step| step.transition) else {
            debug!("Tunnel: connecting event ignored while stopping");
            return;
        };
        self.services.diagnostics.info("Tunnel connecting...".to_string());

        if step.unexpected_disconnect && self.accepting_updates() {
            self.services.events.emit(|sink| sink.unexpected_disconnect());
        }
    }

    fn on_connected(&self) {
        let Some(step) = self.present(SessionFlags::on_connected, |step| step.transition) else {
            debug!("Tunnel: connected event ignored after destroy");
            return;
        };
        self.services.diagnostics.info("Tunnel connected".to_string());
        if !self.accepting_updates() {
            return;
        }
        self.stats.start_connected();
        self.services
            .events
            .emit(|sink| sink.handshake_success(step.is_reconnect));
    }

    fn on_homepage(&self, url: &str) {
        if !self.accepting_updates() {
            return;
        }
        self.session.add_homepage(url);
    }

    fn on_client_region(&self, region: &str) {
        if !self.accepting_updates() {
            return;
        }
        self.session.set_client_region(region);
    }

    fn on_client_upgrade_downloaded(&self, filename: &str) {
        debug!("Tunnel: upgrade downloaded to {filename}");
        self.services.upgrades.notify_upgrade();
    }

    fn on_split_tunnel_region(&self, region: &str) {
        info!("Tunnel: split tunnel region {region}");
    }

    fn on_untunneled_address(&self, address: &str) {
        info!("Tunnel: untunneled address {address}");
    }

    fn on_bytes_transferred(&self, sent: u64, received: u64) {
        if !self.accepting_updates() {
            return;
        }
        self.stats.add_bytes_sent(sent);
        self.stats.add_bytes_received(received);
    }

    fn on_started_waiting_for_network_connectivity(&self) {
        self.services
            .diagnostics
            .info("Waiting for network connectivity...".to_string());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticLevel;
    use crate::events::EventSink;
    use crate::host::{AvailableRegions, UpgradeFiles};
    use crate::tunnel::signal::WakeReason;
    use std::sync::{mpsc, OnceLock, Weak};
    use std::thread;
    use std::time::Duration;

    /// Host that records every call and reports `stop_self` on a channel.
    pub(crate) struct RecordingHost {
        pub calls: Mutex<Vec<String>>,
        pub notifications: Mutex<Vec<Notification>>,
        pub routing: bool,
        stopped_tx: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl RecordingHost {
        pub fn new(routing: bool) -> (Arc<Self>, mpsc::Receiver<()>) {
            let (tx, rx) = mpsc::channel();
            let host = Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                notifications: Mutex::new(Vec::new()),
                routing,
                stopped_tx: Mutex::new(Some(tx)),
            });
            (host, rx)
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    impl HostService for RecordingHost {
        fn app_name(&self) -> String {
            "TestApp".to_string()
        }
        fn start_foreground(&self, _id: u32, _notification: &Notification) {
            self.record("start_foreground");
        }
        fn stop_foreground(&self, _remove: bool) {
            self.record("stop_foreground");
        }
        fn notify(&self, _id: u32, notification: &Notification) {
            self.notifications.lock().unwrap().push(notification.clone());
        }
        fn stop_self(&self) {
            self.record("stop_self");
            if let Some(tx) = self.stopped_tx.lock().unwrap().as_ref() {
                let _ = tx.send(());
            }
        }
        fn routing_available(&self) -> bool {
            self.routing
        }
        fn supports_routing(&self) -> bool {
            self.routing
        }
    }

    /// Event sink that records event names.
    #[derive(Default)]
    pub(crate) struct RecordingEvents {
        pub events: Mutex<Vec<String>>,
    }

    impl RecordingEvents {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingEvents {
        fn tunnel_starting(&self) {
            self.events.lock().unwrap().push("starting".into());
        }
        fn tunnel_stopping(&self) {
            self.events.lock().unwrap().push("stopping".into());
        }
        fn unexpected_disconnect(&self) {
            self.events.lock().unwrap().push("unexpected_disconnect".into());
        }
        fn handshake_success(&self, is_reconnect: bool) {
            self.events
                .lock()
                .unwrap()
                .push(format!("handshake_success({is_reconnect})"));
        }
    }

    pub(crate) struct Fixture {
        pub host: Arc<RecordingHost>,
        pub stopped_rx: mpsc::Receiver<()>,
        pub events: Arc<RecordingEvents>,
        pub regions: Arc<AvailableRegions>,
        pub services: Collaborators,
        pub dir: tempfile::TempDir,
    }

    pub(crate) fn fixture(routing: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let (host, stopped_rx) = RecordingHost::new(routing);
        let events = Arc::new(RecordingEvents::default());
        let slot = Arc::new(EventSinkSlot::new());
        slot.register(events.clone());
        let regions = Arc::new(AvailableRegions::new());
        let services = Collaborators {
            host: host.clone(),
            regions: regions.clone(),
            upgrades: Arc::new(UpgradeFiles::new(dir.path())),
            events: slot,
            diagnostics: Arc::new(DiagnosticLog::detached(100)),
        };
        Fixture {
            host,
            stopped_rx,
            events,
            regions,
            services,
            dir,
        }
    }

    fn new_core(fx: &Fixture) -> TunnelCore {
        let mut config = Config::default();
        config.tunnel.data_dir = fx.dir.path().to_string_lossy().into_owned();
        config.notifications.sound = true;
        TunnelCore::new(Arc::new(config), fx.services.clone())
    }

    fn errors(fx: &Fixture) -> Vec<String> {
        fx.services
            .diagnostics
            .by_level(DiagnosticLevel::Error)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_upstream_proxy_errors_reported_once_per_change() {
        let fx = fixture(false);
        let core = new_core(&fx);
        for msg in ["A", "A", "B", "B", "A"] {
            core.on_upstream_proxy_error(msg);
        }
        assert_eq!(
            errors(&fx),
            vec![
                "Upstream proxy error: A",
                "Upstream proxy error: B",
                "Upstream proxy error: A"
            ]
        );
    }

    #[test]
    fn test_port_in_use_signals_stop() {
        for http in [false, true] {
            let fx = fixture(false);
            let core = new_core(&fx);
            let waiter = core.stop_signal.arm();
            if http {
                core.on_http_proxy_port_in_use(8080);
            } else {
                core.on_socks_proxy_port_in_use(1080);
            }
            assert!(core.signalled_stop());
            assert!(core.stop_signal.is_released());
            assert_eq!(waiter.wait(), WakeReason::Released);
            assert_eq!(errors(&fx).len(), 1);
        }
    }

    #[test]
    fn test_connect_sequence_events_and_alerts() {
        let fx = fixture(false);
        let core = new_core(&fx);

        core.on_connecting();
        core.on_connected();
        core.on_connected();
        core.on_connecting();
        core.on_connected();

        assert_eq!(
            fx.events.events(),
            vec![
                "handshake_success(false)",
                "handshake_success(true)",
                "unexpected_disconnect",
                "handshake_success(true)",
            ]
        );
        let alerts: Vec<bool> = fx
            .host
            .notifications
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.sound)
            .collect();
        assert_eq!(alerts, vec![false, true, false, true, true]);
        assert_eq!(core.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_connecting_while_stopping_changes_nothing() {
        let fx = fixture(false);
        let core = new_core(&fx);
        core.on_connected();
        core.lock_flags().mark_stopping();
        let before = fx.host.notifications.lock().unwrap().len();

        core.on_connecting();

        assert_eq!(fx.host.notifications.lock().unwrap().len(), before);
        assert_eq!(core.state(), ConnectionState::Connected);
        assert!(!fx.events.events().contains(&"unexpected_disconnect".to_string()));
    }

    /// Host that is slow to render one state and remembers what it showed.
    struct SlowHost {
        slow: ConnectionState,
        shown: Mutex<Vec<ConnectionState>>,
    }

    impl HostService for SlowHost {
        fn app_name(&self) -> String {
            "TestApp".to_string()
        }
        fn start_foreground(&self, _id: u32, _notification: &Notification) {}
        fn stop_foreground(&self, _remove: bool) {}
        fn notify(&self, _id: u32, notification: &Notification) {
            if notification.state == self.slow {
                thread::sleep(Duration::from_millis(200));
            }
            self.shown.lock().unwrap().push(notification.state);
        }
        fn stop_self(&self) {}
        fn routing_available(&self) -> bool {
            false
        }
        fn supports_routing(&self) -> bool {
            false
        }
    }

    /// Host whose notify lands a destroy right after the transition applied.
    #[derive(Default)]
    struct DestroyingHost {
        core: OnceLock<Weak<TunnelCore>>,
    }

    impl HostService for DestroyingHost {
        fn app_name(&self) -> String {
            "TestApp".to_string()
        }
        fn start_foreground(&self, _id: u32, _notification: &Notification) {}
        fn stop_foreground(&self, _remove: bool) {}
        fn notify(&self, _id: u32, _notification: &Notification) {
            if let Some(core) = self.core.get().and_then(Weak::upgrade) {
                // The presentation lock is held by this thread already.
                core.lock_flags().mark_destroyed();
            }
        }
        fn stop_self(&self) {}
        fn routing_available(&self) -> bool {
            false
        }
        fn supports_routing(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_concurrent_transitions_leave_host_on_current_state() {
        let fx = fixture(false);
        let host = Arc::new(SlowHost {
            slow: ConnectionState::Connecting,
            shown: Mutex::new(Vec::new()),
        });
        let mut services = fx.services.clone();
        services.host = host.clone();
        let core = Arc::new(TunnelCore::new(Arc::new(Config::default()), services));

        core.on_connected();
        let connecting = {
            let core = Arc::clone(&core);
            thread::spawn(move || core.on_connecting())
        };
        thread::sleep(Duration::from_millis(50));
        core.on_connected();
        connecting.join().unwrap();

        let shown = host.shown.lock().unwrap().clone();
        assert_eq!(shown.len(), 3);
        assert_eq!(shown.last().copied(), Some(core.state()));
    }

    #[test]
    fn test_destroy_during_transition_suppresses_events() {
        for connected_first in [false, true] {
            let fx = fixture(false);
            let host = Arc::new(DestroyingHost::default());
            let mut services = fx.services.clone();
            services.host = host.clone();
            let core = Arc::new(TunnelCore::new(Arc::new(Config::default()), services));
            core.stats.start_session();

            if connected_first {
                // Arm the reconnect flag so connecting would report a disconnect.
                core.on_connected();
                fx.events.events.lock().unwrap().clear();
                host.core.set(Arc::downgrade(&core)).unwrap();
                core.on_connecting();
            } else {
                host.core.set(Arc::downgrade(&core)).unwrap();
                core.on_connected();
            }

            assert!(fx.events.events().is_empty());
            assert!(!core.stats.snapshot().connected);
        }
    }

    #[test]
    fn test_connecting_while_stopping_stops_connected_time() {
        let fx = fixture(false);
        let core = new_core(&fx);
        core.stats.start_session();
        core.on_connected();
        assert!(core.stats.snapshot().connected);

        core.lock_flags().mark_stopping();
        core.on_connecting();

        assert!(!core.stats.snapshot().connected);
        assert_eq!(core.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_absent_event_sink_is_not_an_error() {
        let fx = fixture(false);
        fx.services.events.unregister();
        let core = new_core(&fx);
        core.on_connected();
        core.on_connecting();
        assert!(fx.events.events().is_empty());
        assert_eq!(core.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_session_data_callbacks() {
        let fx = fixture(false);
        let core = new_core(&fx);
        core.on_listening_socks_proxy_port(1080);
        core.on_listening_http_proxy_port(8080);
        core.on_homepage("https://home");
        core.on_client_region("CA");
        core.on_available_egress_regions(&["US".to_string(), "DE".to_string()]);
        core.on_bytes_transferred(100, 200);
        core.on_bytes_transferred(1, 2);

        let info = core.session.snapshot();
        assert_eq!(info.socks_proxy_port, Some(1080));
        assert_eq!(info.http_proxy_port, Some(8080));
        assert_eq!(info.homepages, vec!["https://home"]);
        assert_eq!(info.client_region.as_deref(), Some("CA"));
        assert_eq!(fx.regions.list(), vec!["DE", "US"]);

        let stats = core.stats.snapshot();
        assert_eq!(stats.bytes_sent, 101);
        assert_eq!(stats.bytes_received, 202);
    }

    #[test]
    fn test_engine_config_accessor_is_json() {
        let fx = fixture(false);
        let core = new_core(&fx);
        let json: serde_json::Value = serde_json::from_str(&core.engine_config()).unwrap();
        assert_eq!(json["ClientPlatform"], "Linux");
        assert_eq!(core.app_name(), "TestApp");
    }
}
