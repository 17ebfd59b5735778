//! The JSON configuration document handed to the engine.

use serde::Serialize;

use crate::config::Config;
use crate::host::UpgradeInstaller;

/// Engine configuration. Field names follow the engine's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_download_filename: Option<String>,
    pub client_platform: String,
    pub client_version: String,
    pub propagation_channel_id: String,
    pub sponsor_id: String,
    pub remote_server_list_url: String,
    pub remote_server_list_signature_public_key: String,
    pub local_http_proxy_port: u16,
    pub local_socks_proxy_port: u16,
    pub upstream_proxy_url: String,
    pub egress_region: String,
}

impl EngineConfig {
    pub fn build(config: &Config, upgrades: &dyn UpgradeInstaller) -> Self {
        let client = &config.client;
        let tunnel = &config.tunnel;

        // A verified package awaiting install has a different name than the
        // download target; without this check the engine would fetch the
        // same upgrade again on every connect.
        let download_upgrade = !upgrades.has_pending_upgrade()
            && !client.upgrade_url.is_empty()
            && client.side_loaded
            && tunnel.download_upgrades;

        let (upgrade_download_url, upgrade_download_filename) = if download_upgrade {
            (
                Some(client.upgrade_url.clone()),
                Some(upgrades.download_path().to_string_lossy().into_owned()),
            )
        } else {
            (None, None)
        };

        Self {
            upgrade_download_url,
            upgrade_download_filename,
            client_platform: client.platform.clone(),
            client_version: client.version.clone(),
            propagation_channel_id: client.propagation_channel_id.clone(),
            sponsor_id: client.sponsor_id.clone(),
            remote_server_list_url: client.remote_server_list_url.clone(),
            remote_server_list_signature_public_key: client
                .remote_server_list_signature_public_key
                .clone(),
            local_http_proxy_port: tunnel.local_http_proxy_port,
            local_socks_proxy_port: tunnel.local_socks_proxy_port,
            upstream_proxy_url: tunnel.upstream_proxy_url.clone(),
            egress_region: tunnel.egress_region.clone(),
        }
    }

    /// Serialize for the engine. Serialization failure yields an empty document.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
