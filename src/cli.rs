// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "key-broker",
    version,
    about = "Credential-rotation and failure-recovery broker for rate-limited text-generation APIs",
    long_about = "Spreads generation requests across a pool of API keys, tracks per-key health \
                  (rate limits, error cooldowns, disabled credentials), retries on other keys and \
                  falls back to a secondary provider or placeholder content when every key fails."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "KEY_BROKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server bind address (overrides `server.host`)
    #[arg(long, env = "KEY_BROKER_HOST")]
    pub host: Option<String>,

    /// Server port (overrides `server.port`)
    #[arg(short, long, env = "KEY_BROKER_PORT")]
    pub port: Option<u16>,

    /// Log filter used when `RUST_LOG` is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "KEY_BROKER_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Load and validate the configuration, then exit
    CheckConfig,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
