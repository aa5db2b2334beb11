//! Configuration layer for reachguard.
//!
//! This module provides:
//! - CLI argument parsing ([`Cli`], [`Command`])
//! - TOML configuration file parsing ([`TomlConfig`])
//! - Validated configuration ([`ValidatedConfig`])
//! - Configuration file generation ([`write_default_config`])
//! - Default values ([`defaults`])
//!
//! # Priority
//!
//! Configuration values are resolved with the following priority (highest to lowest):
//!
//! 1. **Explicit CLI arguments** - Values explicitly passed via command line
//! 2. **TOML config file** - Values from the configuration file
//! 3. **Built-in defaults** - Hardcoded default values
//!
//! The notifier URL has no default. It is required unless `--dry-run` is set.
//!
//! # CLI-Only vs TOML-Only Options
//!
//! Monitored endpoints, guard settings and probe tuning only exist in the
//! config file. `--dry-run` and `--verbose` only exist on the command line.
//!
//! The monitor binary takes no interactive input, so it never reads the
//! `[guards]` section. It is parsed for services that embed the library and
//! build a [`GuardContext`](crate::guard::GuardContext) from
//! [`ValidatedConfig::guards`].
//!
//! # Poll Interval
//!
//! `poll_interval = 0` selects a dynamic interval that grows with the number
//! of monitored users (see [`PollInterval`]).

mod cli;
pub mod defaults;
mod error;
mod toml;
mod validated;

#[cfg(test)]
mod cli_tests;
#[cfg(test)]
mod toml_tests;

pub use cli::{Cli, Command};
pub use error::ConfigError;
pub use toml::{TomlConfig, default_config_template};
pub use validated::{EndpointConfig, PollInterval, ValidatedConfig, write_default_config};
