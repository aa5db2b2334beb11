//! Validated configuration after merging CLI and TOML sources.
//!
//! This module contains the final, validated configuration that is used
//! by the application. All validation is performed during construction.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use handlebars::Handlebars;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;

use crate::address::validate as validate_address;
use crate::guard::GuardSettings;
use crate::monitor::TrackerSettings;
use crate::notify::RetryPolicy;

use super::cli::Cli;
use super::defaults;
use super::error::{ConfigError, field};
use super::toml::{EndpointEntry, TomlConfig};

/// How often the driver starts a probe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    /// The same interval regardless of load.
    Fixed(Duration),
    /// 30 s plus 1 s per 10 monitored users, capped at 300 s.
    Dynamic,
}

impl PollInterval {
    /// Returns the interval to use while `users` endpoints are monitored.
    #[must_use]
    pub fn for_users(self, users: usize) -> Duration {
        match self {
            Self::Fixed(interval) => interval,
            Self::Dynamic => {
                let users = u64::try_from(users).unwrap_or(u64::MAX);
                let secs = defaults::DYNAMIC_POLL_BASE_SECS
                    .saturating_add(users / defaults::DYNAMIC_POLL_USERS_PER_SEC)
                    .min(defaults::DYNAMIC_POLL_MAX_SECS);
                Duration::from_secs(secs)
            }
        }
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(interval) => write!(f, "{}s", interval.as_secs()),
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// One endpoint to register at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Owner of the endpoint.
    pub user_id: String,
    /// Validated address.
    pub address: String,
    /// Stabilization setting in minutes.
    pub debounce_minutes: u32,
}

/// Fully validated configuration ready for use by the application.
///
/// # Construction
///
/// Use [`ValidatedConfig::from_raw`] to create from CLI args and optional TOML config.
/// The function validates all inputs and returns errors for invalid configurations.
#[derive(Debug)]
pub struct ValidatedConfig {
    /// Notifier URL. `None` only in dry-run mode.
    pub url: Option<Url>,

    /// HTTP method for notifier requests
    pub method: Method,

    /// HTTP headers for notifier requests
    pub headers: HeaderMap,

    /// Handlebars body template (optional)
    pub body_template: Option<String>,

    /// Timeout for one notifier request
    pub request_timeout: Duration,

    /// Retry policy for failed notifier requests
    pub retry_policy: RetryPolicy,

    /// Polling interval
    pub poll_interval: PollInterval,

    /// Ports tried by the TCP probe
    pub probe_ports: Vec<u16>,

    /// Per-port connect timeout
    pub connect_timeout: Duration,

    /// Tracker timeouts and windows
    pub tracker: TrackerSettings,

    /// Time allowed for the final flush at shutdown
    pub shutdown_timeout: Duration,

    /// Path to the state file, with `~` expanded
    pub state_file: PathBuf,

    /// Action guard windows, for embedders that gate user actions
    pub guards: GuardSettings,

    /// Interval between guard sweeps
    pub sweep_interval: Duration,

    /// Endpoints registered at startup
    pub endpoints: Vec<EndpointConfig>,

    /// Dry-run mode (log notifications without sending them)
    pub dry_run: bool,

    /// Verbose logging enabled
    pub verbose: bool,
}

impl fmt::Display for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url_str = self
            .url
            .as_ref()
            .map_or_else(|| "none".to_string(), ToString::to_string);

        write!(
            f,
            "Config {{ url: {}, method: {}, poll_interval: {}, retry: {}x/{}s, \
             state_file: {}, endpoints: {}, dry_run: {} }}",
            url_str,
            self.method,
            self.poll_interval,
            self.retry_policy.max_attempts,
            self.retry_policy.initial_delay.as_secs(),
            self.state_file.display(),
            self.endpoints.len(),
            self.dry_run,
        )
    }
}

impl ValidatedConfig {
    /// Creates a validated configuration from CLI arguments and optional TOML config.
    ///
    /// CLI arguments take precedence over TOML config values.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `url` is missing outside dry-run mode, or does not parse
    /// - Duration values are zero
    /// - Header format is invalid
    /// - An endpoint address is rejected or a user id repeats
    pub fn from_raw(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Self, ConfigError> {
        let url = Self::resolve_url(cli, toml)?;
        let method = Self::resolve_method(cli, toml)?;
        let headers = Self::resolve_headers(cli, toml)?;
        let body_template = Self::resolve_body_template(cli, toml)?;

        let request_timeout = secs_or_default(
            "notifier.timeout",
            toml.and_then(|t| t.notifier.timeout),
            defaults::REQUEST_TIMEOUT_SECS,
        )?;
        let retry_policy = Self::build_retry_policy(cli, toml)?;

        let poll_interval = Self::resolve_poll_interval(cli, toml);
        let (probe_ports, connect_timeout) = Self::resolve_probe(toml)?;
        let tracker =
            Self::build_tracker_settings(toml, request_timeout, connect_timeout, &retry_policy)?;
        let shutdown_timeout = secs_or_default(
            "monitor.shutdown_timeout",
            toml.and_then(|t| t.monitor.shutdown_timeout),
            defaults::SHUTDOWN_TIMEOUT_SECS,
        )?;
        let state_file = Self::resolve_state_file(cli, toml)?;

        let (guards, sweep_interval) = Self::build_guard_settings(toml)?;
        let endpoints = Self::resolve_endpoints(toml.map_or(&[], |t| t.endpoints.as_slice()))?;

        Ok(Self {
            url,
            method,
            headers,
            body_template,
            request_timeout,
            retry_policy,
            poll_interval,
            probe_ports,
            connect_timeout,
            tracker,
            shutdown_timeout,
            state_file,
            guards,
            sweep_interval,
            endpoints,
            dry_run: cli.dry_run,
            verbose: cli.verbose,
        })
    }

    /// Loads and merges configuration from CLI and optional config file.
    ///
    /// If `cli.config` is set, loads the TOML file from that path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file cannot be read or parsed
    /// - The merged configuration is invalid
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let toml = if let Some(ref path) = cli.config {
            Some(TomlConfig::load(path)?)
        } else {
            None
        };

        Self::from_raw(cli, toml.as_ref())
    }

    fn resolve_url(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Option<Url>, ConfigError> {
        // CLI takes precedence
        let url_str = cli
            .url
            .as_deref()
            .or_else(|| toml.and_then(|t| t.notifier.url.as_deref()));

        let Some(url_str) = url_str else {
            if cli.dry_run {
                return Ok(None);
            }
            return Err(ConfigError::missing(
                field::URL,
                "Use --url or set notifier.url in config file",
            ));
        };

        Url::parse(url_str)
            .map(Some)
            .map_err(|e| ConfigError::InvalidUrl {
                url: url_str.to_string(),
                reason: e.to_string(),
            })
    }

    fn resolve_method(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Method, ConfigError> {
        // Priority: CLI explicit > TOML > default
        let method_str = cli
            .method
            .as_deref()
            .or_else(|| toml.and_then(|t| t.notifier.method.as_deref()))
            .unwrap_or(defaults::METHOD);

        method_str
            .parse::<Method>()
            .map_err(|_| ConfigError::InvalidMethod(method_str.to_string()))
    }

    fn resolve_headers(cli: &Cli, toml: Option<&TomlConfig>) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();

        // Add TOML headers first (CLI can override)
        if let Some(toml) = toml {
            for (name, value) in &toml.notifier.headers {
                let header_name = parse_header_name(name)?;
                let header_value = parse_header_value(name, value)?;
                headers.insert(header_name, header_value);
            }
        }

        for header_str in &cli.headers {
            let (name, value) = parse_header_string(header_str)?;
            let header_name = parse_header_name(&name)?;
            let header_value = parse_header_value(&name, &value)?;
            headers.insert(header_name, header_value);
        }

        let bearer = cli
            .bearer
            .as_deref()
            .or_else(|| toml.and_then(|t| t.notifier.bearer.as_deref()));

        if let Some(token) = bearer {
            let auth_value = format!("Bearer {token}");
            let header_value = parse_header_value("Authorization", &auth_value)?;
            headers.insert(AUTHORIZATION, header_value);
        }

        Ok(headers)
    }

    fn resolve_body_template(
        cli: &Cli,
        toml: Option<&TomlConfig>,
    ) -> Result<Option<String>, ConfigError> {
        let template = cli
            .body_template
            .clone()
            .or_else(|| toml.and_then(|t| t.notifier.body_template.clone()));

        if let Some(ref tmpl) = template {
            Self::validate_template(tmpl)?;
        }

        Ok(template)
    }

    fn validate_template(template: &str) -> Result<(), ConfigError> {
        let hbs = Handlebars::new();
        // Compile-check only; render with empty context to validate syntax
        hbs.render_template(template, &serde_json::json!({}))
            .map_err(|e| ConfigError::InvalidTemplate {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn resolve_poll_interval(cli: &Cli, toml: Option<&TomlConfig>) -> PollInterval {
        // Priority: CLI explicit > TOML > default
        let seconds = cli
            .poll_interval
            .or_else(|| toml.and_then(|t| t.monitor.poll_interval))
            .unwrap_or(defaults::POLL_INTERVAL_SECS);

        if seconds == 0 {
            PollInterval::Dynamic
        } else {
            PollInterval::Fixed(Duration::from_secs(seconds))
        }
    }

    fn resolve_probe(toml: Option<&TomlConfig>) -> Result<(Vec<u16>, Duration), ConfigError> {
        let monitor = toml.map(|t| &t.monitor);

        let ports = monitor
            .and_then(|m| m.probe_ports.clone())
            .unwrap_or_else(|| defaults::PROBE_PORTS.to_vec());
        if ports.is_empty() {
            return Err(ConfigError::NoProbePorts);
        }

        let connect_timeout = secs_or_default(
            "monitor.connect_timeout",
            monitor.and_then(|m| m.connect_timeout),
            defaults::CONNECT_TIMEOUT_SECS,
        )?;

        Ok((ports, connect_timeout))
    }

    /// The notify budget must cover every attempt plus the backoff sleeps,
    /// so it grows with the retry policy. The probe budget must leave room
    /// for name resolution on top of one connect attempt.
    fn build_tracker_settings(
        toml: Option<&TomlConfig>,
        request_timeout: Duration,
        connect_timeout: Duration,
        retry_policy: &RetryPolicy,
    ) -> Result<TrackerSettings, ConfigError> {
        let monitor = toml.map(|t| &t.monitor);

        let probe_timeout = secs_or_default(
            "monitor.probe_timeout",
            monitor.and_then(|m| m.probe_timeout),
            defaults::PROBE_TIMEOUT_SECS,
        )?;
        if probe_timeout <= connect_timeout {
            return Err(ConfigError::InvalidDuration {
                field: "monitor.probe_timeout",
                reason: format!(
                    "must be longer than monitor.connect_timeout ({}s)",
                    connect_timeout.as_secs()
                ),
            });
        }
        let persist_timeout = secs_or_default(
            "monitor.persist_timeout",
            monitor.and_then(|m| m.persist_timeout),
            defaults::PERSIST_TIMEOUT_SECS,
        )?;

        let notify_timeout = request_timeout
            .saturating_mul(retry_policy.max_attempts)
            .saturating_add(retry_policy.worst_case_delay())
            .max(TrackerSettings::DEFAULT_NOTIFY_TIMEOUT);

        Ok(TrackerSettings {
            probe_timeout,
            notify_timeout,
            persist_timeout,
            ..TrackerSettings::default()
        })
    }

    fn build_retry_policy(
        cli: &Cli,
        toml: Option<&TomlConfig>,
    ) -> Result<RetryPolicy, ConfigError> {
        let retry = toml.map(|t| &t.retry);

        // Priority: CLI explicit > TOML > default
        let max_attempts = cli
            .retry_max
            .or_else(|| retry.and_then(|r| r.max_attempts))
            .unwrap_or(defaults::RETRY_MAX_ATTEMPTS);

        let initial_delay_secs = cli
            .retry_delay
            .or_else(|| retry.and_then(|r| r.initial_delay))
            .unwrap_or(defaults::RETRY_INITIAL_DELAY_SECS);

        let max_delay_secs = retry
            .and_then(|r| r.max_delay)
            .unwrap_or(defaults::RETRY_MAX_DELAY_SECS);

        let multiplier = retry
            .and_then(|r| r.multiplier)
            .unwrap_or(defaults::RETRY_MULTIPLIER);

        if max_attempts == 0 {
            return Err(ConfigError::InvalidRetry(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if initial_delay_secs == 0 {
            return Err(ConfigError::InvalidRetry(
                "initial_delay must be greater than 0".to_string(),
            ));
        }

        if multiplier <= 0.0 || !multiplier.is_finite() {
            return Err(ConfigError::InvalidRetry(
                "multiplier must be a positive finite number".to_string(),
            ));
        }

        if max_delay_secs < initial_delay_secs {
            return Err(ConfigError::InvalidRetry(format!(
                "max_delay ({max_delay_secs}s) must be >= initial_delay ({initial_delay_secs}s)"
            )));
        }

        Ok(RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_secs(initial_delay_secs))
            .with_max_delay(Duration::from_secs(max_delay_secs))
            .with_multiplier(multiplier))
    }

    fn resolve_state_file(cli: &Cli, toml: Option<&TomlConfig>) -> Result<PathBuf, ConfigError> {
        // CLI takes precedence
        if let Some(ref path) = cli.state_file {
            return path
                .to_str()
                .map_or_else(|| Ok(path.clone()), expand_tilde);
        }

        let configured = toml
            .and_then(|t| t.monitor.state_file.as_deref())
            .unwrap_or(defaults::STATE_FILE);
        expand_tilde(configured)
    }

    fn build_guard_settings(
        toml: Option<&TomlConfig>,
    ) -> Result<(GuardSettings, Duration), ConfigError> {
        let guards = toml.map(|t| &t.guards);

        let rate_limit_ms = guards
            .and_then(|g| g.rate_limit_ms)
            .unwrap_or(defaults::RATE_LIMIT_MS);
        if rate_limit_ms == 0 {
            return Err(ConfigError::InvalidDuration {
                field: "guards.rate_limit_ms",
                reason: "must be greater than 0".to_string(),
            });
        }

        let default_cooldown = secs_or_default(
            "guards.cooldown_secs",
            guards.and_then(|g| g.cooldown_secs),
            defaults::COOLDOWN_SECS,
        )?;
        let retention = secs_or_default(
            "guards.retention_secs",
            guards.and_then(|g| g.retention_secs),
            defaults::RETENTION_SECS,
        )?;
        let sweep_interval = secs_or_default(
            "guards.sweep_interval_secs",
            guards.and_then(|g| g.sweep_interval_secs),
            defaults::SWEEP_INTERVAL_SECS,
        )?;

        // A zero override disables the cooldown for that action.
        let cooldowns: HashMap<String, Duration> = guards
            .map(|g| {
                g.cooldowns
                    .iter()
                    .map(|(action, secs)| (action.clone(), Duration::from_secs(*secs)))
                    .collect()
            })
            .unwrap_or_default();

        let settings = GuardSettings {
            rate_limit_window: Duration::from_millis(rate_limit_ms),
            default_cooldown,
            cooldowns,
            retention,
        };
        Ok((settings, sweep_interval))
    }

    fn resolve_endpoints(entries: &[EndpointEntry]) -> Result<Vec<EndpointConfig>, ConfigError> {
        let mut seen = HashSet::new();
        let mut endpoints = Vec::with_capacity(entries.len());

        for entry in entries {
            let user_id = entry.user_id.trim();
            let address = entry.address.trim();

            if user_id.is_empty() {
                return Err(ConfigError::EmptyUserId {
                    address: address.to_string(),
                });
            }
            if !seen.insert(user_id) {
                return Err(ConfigError::DuplicateEndpoint {
                    user_id: user_id.to_string(),
                });
            }
            validate_address(address).map_err(|rejection| ConfigError::InvalidAddress {
                user_id: user_id.to_string(),
                address: address.to_string(),
                reason: rejection.reason(),
            })?;

            endpoints.push(EndpointConfig {
                user_id: user_id.to_string(),
                address: address.to_string(),
                debounce_minutes: entry.debounce_minutes,
            });
        }

        Ok(endpoints)
    }
}

/// Writes the default configuration template to a file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let template = super::toml::default_config_template();
    std::fs::write(path, template).map_err(|e| ConfigError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

// Helper functions

fn secs_or_default(
    field: &'static str,
    value: Option<u64>,
    default: u64,
) -> Result<Duration, ConfigError> {
    let seconds = value.unwrap_or(default);
    if seconds == 0 {
        return Err(ConfigError::InvalidDuration {
            field,
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(Duration::from_secs(seconds))
}

fn expand_tilde(path: &str) -> Result<PathBuf, ConfigError> {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') || rest.starts_with('\\') => &rest[1..],
        _ => return Ok(PathBuf::from(path)),
    };

    let home = dirs::home_dir().ok_or_else(|| ConfigError::InvalidStateFile {
        path: path.to_string(),
        reason: "home directory is unknown",
    })?;
    Ok(if rest.is_empty() { home } else { home.join(rest) })
}

fn parse_header_string(s: &str) -> Result<(String, String), ConfigError> {
    // Try "Key=Value" format first
    if let Some((name, value)) = s.split_once('=') {
        return Ok((name.trim().to_string(), value.trim().to_string()));
    }

    // Try "Key: Value" format
    if let Some((name, value)) = s.split_once(':') {
        return Ok((name.trim().to_string(), value.trim().to_string()));
    }

    Err(ConfigError::InvalidHeader {
        value: s.to_string(),
    })
}

fn parse_header_name(name: &str) -> Result<HeaderName, ConfigError> {
    name.parse::<HeaderName>()
        .map_err(|e| ConfigError::InvalidHeaderName {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeaderValue {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
