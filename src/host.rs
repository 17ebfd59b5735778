//! Collaborators the tunnel manager drives but does not implement.
//!
//! The hosting service owns the process, the foreground notification, and
//! the device's VPN facility. Region bookkeeping and upgrade installation
//! are separate services. All of them are called from the tunnel worker or
//! engine threads, so every trait is `Send + Sync`.

use std::collections::BTreeSet;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::info;

use crate::notification::Notification;

/// The background service hosting the tunnel.
pub trait HostService: Send + Sync {
    /// Human-readable application name, used as notification title.
    fn app_name(&self) -> String;

    /// Enter foreground mode, showing `notification` under `id`.
    fn start_foreground(&self, id: u32, notification: &Notification);

    /// Leave foreground mode, optionally removing the notification.
    fn stop_foreground(&self, remove_notification: bool);

    /// Replace the notification shown under `id`.
    fn notify(&self, id: u32, notification: &Notification);

    /// Ask the service to terminate itself.
    fn stop_self(&self);

    /// The device offers a whole-device routing facility at all.
    fn routing_available(&self) -> bool;

    /// This particular host instance was started as a VPN service and can
    /// route. Guards against the mode flag flipping under a running host.
    fn supports_routing(&self) -> bool;

    /// Established VPN interface, if the host is running one.
    fn vpn_service(&self) -> Option<VpnService> {
        None
    }

    /// A fresh builder for the VPN interface, if the host can route.
    fn new_vpn_builder(&self) -> Option<Box<dyn VpnBuilder>> {
        None
    }
}

/// Handle to an established VPN interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VpnService {
    /// Packet file descriptor of the tun interface.
    pub fd: RawFd,
}

/// Builder the engine uses to configure the VPN interface before routing.
pub trait VpnBuilder: Send {
    fn add_address(&mut self, address: &str, prefix_len: u8);
    fn add_route(&mut self, address: &str, prefix_len: u8);
    fn add_dns_server(&mut self, address: &str);
    fn set_mtu(&mut self, mtu: u16);
    /// Create the interface. Returns the packet fd.
    fn establish(self: Box<Self>) -> std::io::Result<VpnService>;
}

/// Records which egress regions currently have servers.
pub trait RegionRegistry: Send + Sync {
    fn set_server_exists(&self, region: &str, exists: bool);
}

/// Installs client upgrades fetched by the engine.
pub trait UpgradeInstaller: Send + Sync {
    /// A downloaded upgrade may be ready; tell the user if so.
    fn notify_upgrade(&self);

    /// A verified upgrade is waiting for the user to apply it.
    fn has_pending_upgrade(&self) -> bool;

    /// Where the engine should write a downloaded upgrade package.
    fn download_path(&self) -> PathBuf;
}

/// In-memory [`RegionRegistry`].
#[derive(Debug, Default)]
pub struct AvailableRegions {
    regions: Mutex<BTreeSet<String>>,
}

impl AvailableRegions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        match self.regions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Regions with servers, sorted.
    pub fn list(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }
}

impl RegionRegistry for AvailableRegions {
    fn set_server_exists(&self, region: &str, exists: bool) {
        let mut regions = self.lock();
        if exists {
            regions.insert(region.to_string());
        } else {
            regions.remove(region);
        }
    }
}

/// [`UpgradeInstaller`] backed by two well-known files in the data directory:
/// the engine's download target and the verified package awaiting install.
#[derive(Debug, Clone)]
pub struct UpgradeFiles {
    download: PathBuf,
    verified: PathBuf,
}

impl UpgradeFiles {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            download: data_dir.join("upgrade.download"),
            verified: data_dir.join("upgrade.verified"),
        }
    }
}

impl UpgradeInstaller for UpgradeFiles {
    fn notify_upgrade(&self) {
        if self.verified.exists() {
            info!("Upgrade: verified package ready at {}", self.verified.display());
        }
    }

    fn has_pending_upgrade(&self) -> bool {
        self.verified.exists()
    }

    fn download_path(&self) -> PathBuf {
        self.download.clone()
    }
}
