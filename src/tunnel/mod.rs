//! Host-side lifecycle of a tunnel session.
//!
//! - [`manager`]: `TunnelManager`: start/stop protocol, worker thread, teardown
//! - [`handler`]: `TunnelCore`: shared state and the engine callback surface
//! - [`machine`]: connection state machine and alert policy
//! - [`signal`]: one-shot stop gate
//! - [`entries`]: server entry list with one-time legacy import
//! - [`engine`]: command/callback contract with the tunneling engine
//! - [`engine_config`]: JSON configuration handed to the engine

pub mod engine;
pub mod engine_config;
pub mod entries;
pub mod handler;
pub mod machine;
pub mod manager;
pub mod signal;
