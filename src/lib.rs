#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

//! tunhost library: host-side lifecycle controller for a tunnel session.
//!
//! This library exposes the building blocks a hosting service wires together:
//! - `tunnel`: the manager, its worker thread, engine contract, state machine
//! - `host`: hosting-service, VPN, region and upgrade collaborator traits
//! - `events`: optional UI event sink
//! - `diagnostics`: user-visible diagnostic journal
//! - `notification`: connection state projected into a notification
//! - `stats`: data-transfer accounting
//! - `state`: session data published for the UI
//! - `config`: configuration loading

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod host;
pub mod notification;
pub mod state;
pub mod stats;
pub mod tunnel;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use error::{ConfigError, EngineError, ManagerError};
pub use events::{BroadcastEvents, EventSink, EventSinkSlot};
pub use host::{HostService, RegionRegistry, UpgradeInstaller};
pub use tunnel::engine::{Engine, EngineCallbacks};
pub use tunnel::handler::Collaborators;
pub use tunnel::machine::ConnectionState;
pub use tunnel::manager::TunnelManager;
