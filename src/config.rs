//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `TUNHOST_EGRESS_REGION`,
//!    `TUNHOST_UPSTREAM_PROXY_URL`, `TUNHOST_DATA_DIR`
//! 2. **Config file**: path via `--config <path>`, or `tunhost.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [client]
//! platform = "Linux"
//! version = "1"
//! propagation_channel_id = "FFFFFFFFFFFFFFFF"
//! sponsor_id = "FFFFFFFFFFFFFFFF"
//! remote_server_list_url = "https://example.com/server_list"
//! remote_server_list_signature_public_key = "..."
//! upgrade_url = ""                      # empty disables upgrade downloads
//! side_loaded = false                   # install eligible for self-upgrade
//! embedded_server_entries = ["..."]
//!
//! [tunnel]
//! whole_device = false
//! local_socks_proxy_port = 0            # 0 = engine picks
//! local_http_proxy_port = 0
//! upstream_proxy_url = ""
//! egress_region = ""                    # empty = best performance
//! data_dir = "/var/lib/tunhost"
//! legacy_entries_file = "server_entries.json"
//! max_legacy_entries = 100
//! download_upgrades = true
//!
//! [notifications]
//! sound = false
//! vibrate = false
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values baked into a client build and passed through to the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Platform identifier reported to the network (default `Linux`).
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Client build version (default: this crate's version).
    #[serde(default = "default_client_version")]
    pub version: String,
    #[serde(default)]
    pub propagation_channel_id: String,
    #[serde(default)]
    pub sponsor_id: String,
    #[serde(default)]
    pub remote_server_list_url: String,
    #[serde(default)]
    pub remote_server_list_signature_public_key: String,
    /// Upgrade package URL. Empty disables upgrade downloads entirely.
    #[serde(default)]
    pub upgrade_url: String,
    /// Whether this install was side-loaded and may upgrade itself.
    #[serde(default)]
    pub side_loaded: bool,
    /// Server entries shipped with the build, one opaque record each.
    #[serde(default)]
    pub embedded_server_entries: Vec<String>,
}

/// Per-session tunnel settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelConfig {
    /// Route all device traffic through the tunnel when the host supports it.
    #[serde(default)]
    pub whole_device: bool,
    /// Local SOCKS proxy port requested from the engine (0 = any).
    #[serde(default)]
    pub local_socks_proxy_port: u16,
    /// Local HTTP proxy port requested from the engine (0 = any).
    #[serde(default)]
    pub local_http_proxy_port: u16,
    /// Upstream proxy the engine dials through. Override with `TUNHOST_UPSTREAM_PROXY_URL`.
    #[serde(default)]
    pub upstream_proxy_url: String,
    /// Egress region selector. Override with `TUNHOST_EGRESS_REGION`.
    #[serde(default)]
    pub egress_region: String,
    /// Directory for persistent data. Override with `TUNHOST_DATA_DIR`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// File name (under `data_dir`) of the legacy server entry store.
    #[serde(default = "default_legacy_entries_file")]
    pub legacy_entries_file: String,
    /// Ceiling on records imported from the legacy store (default 100).
    #[serde(default = "default_max_legacy_entries")]
    pub max_legacy_entries: usize,
    /// Let the engine download client upgrades (default true).
    #[serde(default = "default_download_upgrades")]
    pub download_upgrades: bool,
}

/// Alert preferences applied when the connection state changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub sound: bool,
    #[serde(default)]
    pub vibrate: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_platform() -> String {
    "Linux".to_string()
}
fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_data_dir() -> String {
    "/var/lib/tunhost".to_string()
}
fn default_legacy_entries_file() -> String {
    "server_entries.json".to_string()
}
fn default_max_legacy_entries() -> usize {
    100
}
fn default_download_upgrades() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            version: default_client_version(),
            propagation_channel_id: String::new(),
            sponsor_id: String::new(),
            remote_server_list_url: String::new(),
            remote_server_list_signature_public_key: String::new(),
            upgrade_url: String::new(),
            side_loaded: false,
            embedded_server_entries: Vec::new(),
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            whole_device: false,
            local_socks_proxy_port: 0,
            local_http_proxy_port: 0,
            upstream_proxy_url: String::new(),
            egress_region: String::new(),
            data_dir: default_data_dir(),
            legacy_entries_file: default_legacy_entries_file(),
            max_legacy_entries: default_max_legacy_entries(),
            download_upgrades: default_download_upgrades(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TunnelConfig {
    /// Full path of the legacy server entry store.
    pub fn legacy_entries_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.legacy_entries_file)
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise looks for
    /// `tunhost.toml` in the current directory, falling back to compiled defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new("tunhost.toml").exists() => Self::from_file("tunhost.toml")?,
            None => Config::default(),
        };

        // Env var overrides
        if let Ok(region) = std::env::var("TUNHOST_EGRESS_REGION") {
            config.tunnel.egress_region = region;
        }
        if let Ok(url) = std::env::var("TUNHOST_UPSTREAM_PROXY_URL") {
            config.tunnel.upstream_proxy_url = url;
        }
        if let Ok(dir) = std::env::var("TUNHOST_DATA_DIR") {
            config.tunnel.data_dir = dir;
        }

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Parse a TOML document, filling unspecified fields with defaults.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
