//! CLI argument parsing using clap.
//!
//! Defines the command-line interface with all options and subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// reachguard: debounced reachability notifications
///
/// Probes user-registered addresses, waits for each change to stabilize,
/// and notifies an external service when an endpoint goes up or down.
#[derive(Debug, Parser)]
#[command(name = "reachguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Notifier URL (required unless --dry-run)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// HTTP method for notifier requests
    #[arg(long)]
    pub method: Option<String>,

    /// HTTP headers in 'Key=Value' or 'Key: Value' format (can be specified multiple times)
    #[arg(long = "header", value_name = "K=V")]
    pub headers: Vec<String>,

    /// Bearer token for Authorization header
    #[arg(long)]
    pub bearer: Option<String>,

    /// Handlebars body template for notifier requests
    #[arg(long = "body-template")]
    pub body_template: Option<String>,

    /// Polling interval in seconds (0 = scale with the number of users)
    #[arg(long = "poll-interval")]
    pub poll_interval: Option<u64>,

    /// Path to the state file that keeps endpoint state across restarts
    #[arg(long = "state-file")]
    pub state_file: Option<PathBuf>,

    /// Maximum number of delivery attempts
    #[arg(long = "retry-max")]
    pub retry_max: Option<u32>,

    /// Initial retry delay in seconds
    #[arg(long = "retry-delay")]
    pub retry_delay: Option<u64>,

    /// Path to configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Test mode - log notifications without sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    pub verbose: bool,
}

/// Subcommands for reachguard
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a default configuration file
    Init {
        /// Output path for the configuration file
        #[arg(long, short, default_value = "reachguard.toml")]
        output: PathBuf,
    },

    /// Check whether an address may be monitored
    Check {
        /// Hostname or IP address, optionally with a port
        address: String,
    },
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parses CLI arguments from an iterator (useful for testing).
    pub fn parse_from_iter<I, T>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::parse_from(iter)
    }

    /// Returns true if this is the init command.
    #[must_use]
    pub const fn is_init(&self) -> bool {
        matches!(self.command, Some(Command::Init { .. }))
    }
}
