//! TOML configuration file parsing.
//!
//! Defines the structure of the configuration file with serde.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::ConfigError;

/// Root configuration structure from TOML file.
///
/// All fields are optional to allow partial configuration
/// that can be merged with CLI arguments.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Notifier configuration section
    #[serde(default)]
    pub notifier: NotifierSection,

    /// Monitoring configuration
    #[serde(default)]
    pub monitor: MonitorSection,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetrySection,

    /// Action guard configuration
    #[serde(default)]
    pub guards: GuardsSection,

    /// Monitored endpoints
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointEntry>,
}

/// Notifier configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierSection {
    /// Notifier URL
    pub url: Option<String>,

    /// HTTP method (default: POST)
    pub method: Option<String>,

    /// HTTP headers as key-value pairs
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Bearer token for Authorization header
    pub bearer: Option<String>,

    /// Handlebars body template
    pub body_template: Option<String>,

    /// Per-request timeout in seconds
    pub timeout: Option<u64>,
}

/// Monitoring configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorSection {
    /// Polling interval in seconds (0 = dynamic)
    pub poll_interval: Option<u64>,

    /// Ports tried by the TCP probe
    pub probe_ports: Option<Vec<u16>>,

    /// Per-port connect timeout in seconds
    pub connect_timeout: Option<u64>,

    /// Outer timeout around one probe call in seconds
    pub probe_timeout: Option<u64>,

    /// Timeout for one state write in seconds
    pub persist_timeout: Option<u64>,

    /// Time allowed for the final flush at shutdown in seconds
    pub shutdown_timeout: Option<u64>,

    /// Path to state file for persistence across restarts
    pub state_file: Option<String>,
}

/// Retry policy configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    /// Maximum number of delivery attempts
    pub max_attempts: Option<u32>,

    /// Initial retry delay in seconds
    pub initial_delay: Option<u64>,

    /// Maximum retry delay in seconds
    pub max_delay: Option<u64>,

    /// Backoff multiplier
    pub multiplier: Option<f64>,
}

/// Action guard configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardsSection {
    /// Minimum spacing between identical actions in milliseconds
    pub rate_limit_ms: Option<u64>,

    /// Default per-action cooldown in seconds
    pub cooldown_secs: Option<u64>,

    /// Idle time before guard entries are evicted, in seconds
    pub retention_secs: Option<u64>,

    /// Interval between sweeps in seconds
    pub sweep_interval_secs: Option<u64>,

    /// Per-action cooldown overrides in seconds
    #[serde(default)]
    pub cooldowns: HashMap<String, u64>,
}

/// One `[[endpoint]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointEntry {
    /// Owner of the endpoint
    pub user_id: String,

    /// Hostname or IP address to probe
    pub address: String,

    /// Stabilization setting in minutes (0 = minimum window)
    #[serde(default)]
    pub debounce_minutes: u32,
}

impl TomlConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::from)
    }
}

/// Generates a default configuration file with comments.
#[must_use]
pub fn default_config_template() -> String {
    r#"# reachguard configuration file

[notifier]
# Notifier URL (required unless --dry-run)
# url = "https://api.example.com/reachability"

# HTTP method (default: POST, can be overridden by --method CLI flag)
# method = "POST"

# HTTP headers
# [notifier.headers]
# X-Custom-Header = "value"

# Bearer token for Authorization header
# bearer = "your-token-here"

# Handlebars body template (default: JSON payload)
# Available variables: {{user_id}}, {{address}}, {{state}}, {{previous}},
# {{changed_at}}, {{message}}
# body_template = '{"text": "{{message}}"}'

# Per-request timeout in seconds (default: 10)
# timeout = 10

[monitor]
# Polling interval in seconds (default: 60)
# 0 = 30s plus 1s per 10 monitored users, capped at 300s
poll_interval = 60

# Ports tried by the reachability probe (default: [80, 443])
# probe_ports = [80, 443]

# Per-port connect timeout in seconds (default: 3)
# connect_timeout = 3

# Upper bound for one probe in seconds (default: 10)
# probe_timeout = 10

# Upper bound for one state write in seconds (default: 5)
# persist_timeout = 5

# Time allowed for the final flush at shutdown in seconds (default: 10)
# shutdown_timeout = 10

# State file (default: ~/.reachguard/state.json)
# state_file = "~/.reachguard/state.json"

[retry]
# Maximum number of delivery attempts (default: 3)
# max_attempts = 3

# Initial retry delay in seconds (default: 1)
# initial_delay = 1

# Maximum retry delay in seconds (default: 10)
# max_delay = 10

# Backoff multiplier (default: 2.0)
# multiplier = 2.0

# Action guards, read by services that embed reachguard
[guards]
# Minimum spacing between identical actions in milliseconds (default: 1000)
# rate_limit_ms = 1000

# Default cooldown after a completed action in seconds (default: 5)
# cooldown_secs = 5

# Idle time before guard entries are evicted in seconds (default: 1800)
# retention_secs = 1800

# Interval between sweeps in seconds (default: 300)
# sweep_interval_secs = 300

# Per-action cooldown overrides in seconds
# [guards.cooldowns]
# set_monitor = 30

# Monitored endpoints (repeat for each user)
# [[endpoint]]
# user_id = "alice"
# address = "example.com:443"
# debounce_minutes = 1
"#
    .to_string()
}
