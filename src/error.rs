//! Error types for the tunnel host.
//!
//! Engine failures end a session start but never the process: the manager
//! reports them once and falls through to teardown. Configuration errors are
//! surfaced to the binary, which exits.

use thiserror::Error;

/// Failures reported by the tunneling engine when a session is started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("application is not prepared or revoked")]
    RoutingRefused,

    #[error("failed to start tunneling: {0}")]
    StartFailed(String),
}

/// Errors from the lifecycle controller itself.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("failed to spawn tunnel worker thread: {0}")]
    SpawnWorker(#[source] std::io::Error),
}

/// Errors while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
