#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # tunhost
//!
//! Operator tooling for the tunnel host. The lifecycle controller itself is
//! embedded by a hosting service through the library; this binary inspects
//! what a session would be started with.
//!
//! ## Subcommands
//!
//! - `tunhost config`: print the JSON configuration handed to the engine
//! - `tunhost entries`: build the server entry list (performing the one-time
//!   legacy import) and report its size

use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use tunhost::config::Config;
use tunhost::host::UpgradeFiles;
use tunhost::tunnel::engine_config::EngineConfig;
use tunhost::tunnel::entries::build_entry_list;

/// Host-side tunnel session tooling.
#[derive(Parser)]
#[command(name = "tunhost", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the engine configuration document.
    Config {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
    /// Build the server entry list and print its size.
    Entries {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
        /// Also print every entry, one per line.
        #[arg(long)]
        list: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Config { config } | Commands::Entries { config, .. } => config.as_deref(),
    };
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tunhost: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config { .. } => {
            let upgrades = UpgradeFiles::new(Path::new(&config.tunnel.data_dir));
            let document = EngineConfig::build(&config, &upgrades).to_json();
            if document.is_empty() {
                error!("Failed to serialize engine configuration");
                return ExitCode::FAILURE;
            }
            println!("{document}");
        }
        Commands::Entries { list, .. } => {
            let tunnel = &config.tunnel;
            let entries = build_entry_list(
                &config.client.embedded_server_entries,
                &tunnel.legacy_entries_path(),
                tunnel.max_legacy_entries,
            );
            info!(
                "{} embedded, {} total",
                config.client.embedded_server_entries.len(),
                entries.len()
            );
            if list {
                print!("{}", entries.to_engine_string());
            } else {
                println!("{}", entries.len());
            }
        }
    }

    ExitCode::SUCCESS
}
