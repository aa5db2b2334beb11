//! Tests for TOML configuration parsing.

use super::ConfigError;
use super::toml::{TomlConfig, default_config_template};

mod sections {
    use super::*;

    #[test]
    fn empty_config_parses_with_defaults() {
        let config = TomlConfig::parse("").unwrap();

        assert!(config.notifier.url.is_none());
        assert!(config.notifier.headers.is_empty());
        assert!(config.monitor.poll_interval.is_none());
        assert!(config.guards.cooldowns.is_empty());
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = TomlConfig::parse(
            r#"
            [notifier]
            url = "https://example.com/notify"
            method = "PUT"
            bearer = "token"
            body_template = '{"text": "{{message}}"}'
            timeout = 15

            [notifier.headers]
            X-Source = "reachguard"

            [monitor]
            poll_interval = 0
            probe_ports = [22, 443]
            connect_timeout = 2
            probe_timeout = 8
            persist_timeout = 4
            shutdown_timeout = 20
            state_file = "/tmp/state.json"

            [retry]
            max_attempts = 5
            initial_delay = 2
            max_delay = 30
            multiplier = 1.5

            [guards]
            rate_limit_ms = 500
            cooldown_secs = 10
            retention_secs = 600
            sweep_interval_secs = 60

            [guards.cooldowns]
            set_monitor = 30
        "#,
        )
        .unwrap();

        assert_eq!(config.notifier.url.as_deref(), Some("https://example.com/notify"));
        assert_eq!(config.notifier.method.as_deref(), Some("PUT"));
        assert_eq!(config.notifier.timeout, Some(15));
        assert_eq!(
            config.notifier.headers.get("X-Source").map(String::as_str),
            Some("reachguard")
        );
        assert_eq!(config.monitor.poll_interval, Some(0));
        assert_eq!(config.monitor.probe_ports, Some(vec![22, 443]));
        assert_eq!(config.monitor.shutdown_timeout, Some(20));
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.multiplier, Some(1.5));
        assert_eq!(config.guards.rate_limit_ms, Some(500));
        assert_eq!(config.guards.cooldowns.get("set_monitor"), Some(&30));
    }

    #[test]
    fn endpoints_parse_as_array_of_tables() {
        let config = TomlConfig::parse(
            r#"
            [[endpoint]]
            user_id = "alice"
            address = "example.com"
            debounce_minutes = 2

            [[endpoint]]
            user_id = "bob"
            address = "8.8.8.8:53"
        "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].user_id, "alice");
        assert_eq!(config.endpoints[0].debounce_minutes, 2);
        assert_eq!(config.endpoints[1].address, "8.8.8.8:53");
        assert_eq!(config.endpoints[1].debounce_minutes, 0);
    }
}

mod rejection {
    use super::*;

    #[test]
    fn unknown_top_level_section_is_rejected() {
        let result = TomlConfig::parse("[webhook]\nurl = \"https://example.com\"");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = TomlConfig::parse("[monitor]\npoll_only = true");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn endpoint_without_address_is_rejected() {
        let result = TomlConfig::parse("[[endpoint]]\nuser_id = \"alice\"");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let result = TomlConfig::parse("[monitor]\npoll_interval = \"often\"");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }
}

mod loading {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[notifier]\nurl = \"https://example.com\"").unwrap();

        let config = TomlConfig::load(file.path()).unwrap();
        assert_eq!(config.notifier.url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn load_missing_file_reports_path() {
        let path = std::path::Path::new("/nonexistent/reachguard.toml");
        match TomlConfig::load(path) {
            Err(ConfigError::FileRead { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("Expected FileRead, got {other:?}"),
        }
    }

    #[test]
    fn default_template_is_valid_toml() {
        let config = TomlConfig::parse(&default_config_template()).unwrap();

        assert_eq!(config.monitor.poll_interval, Some(60));
        assert!(config.endpoints.is_empty());
    }
}
