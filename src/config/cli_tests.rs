//! Tests for CLI argument parsing.

use super::cli::{Cli, Command};

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_args() {
        let cli = Cli::parse_from_iter(["reachguard", "--url", "https://example.com/notify"]);

        assert_eq!(cli.url.as_deref(), Some("https://example.com/notify"));
        assert!(cli.command.is_none());
        assert!(!cli.dry_run);
        assert!(!cli.verbose);
    }

    #[test]
    fn parse_http_options() {
        let cli = Cli::parse_from_iter([
            "reachguard",
            "--url",
            "https://example.com",
            "--method",
            "PUT",
            "--header",
            "X-Api-Key=secret",
            "--header",
            "Content-Type: application/json",
            "--bearer",
            "token123",
            "--body-template",
            r#"{"text":"{{message}}"}"#,
        ]);

        assert_eq!(cli.method.as_deref(), Some("PUT"));
        assert_eq!(cli.headers, ["X-Api-Key=secret", "Content-Type: application/json"]);
        assert_eq!(cli.bearer.as_deref(), Some("token123"));
        assert_eq!(cli.body_template.as_deref(), Some(r#"{"text":"{{message}}"}"#));
    }

    #[test]
    fn parse_monitor_and_retry_options() {
        let cli = Cli::parse_from_iter([
            "reachguard",
            "--poll-interval",
            "0",
            "--state-file",
            "/var/lib/reachguard/state.json",
            "--retry-max",
            "5",
            "--retry-delay",
            "2",
        ]);

        assert_eq!(cli.poll_interval, Some(0));
        assert_eq!(
            cli.state_file.as_deref(),
            Some(std::path::Path::new("/var/lib/reachguard/state.json"))
        );
        assert_eq!(cli.retry_max, Some(5));
        assert_eq!(cli.retry_delay, Some(2));
    }

    #[test]
    fn parse_short_flags() {
        let cli = Cli::parse_from_iter(["reachguard", "-c", "reachguard.toml", "-v", "--dry-run"]);

        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("reachguard.toml"))
        );
        assert!(cli.verbose);
        assert!(cli.dry_run);
    }
}

mod subcommands {
    use super::*;

    #[test]
    fn init_uses_default_output() {
        let cli = Cli::parse_from_iter(["reachguard", "init"]);

        assert!(cli.is_init());
        match cli.command {
            Some(Command::Init { output }) => {
                assert_eq!(output, std::path::PathBuf::from("reachguard.toml"));
            }
            other => panic!("Expected Init, got {other:?}"),
        }
    }

    #[test]
    fn init_accepts_custom_output() {
        let cli = Cli::parse_from_iter(["reachguard", "init", "--output", "/tmp/custom.toml"]);

        match cli.command {
            Some(Command::Init { output }) => {
                assert_eq!(output, std::path::PathBuf::from("/tmp/custom.toml"));
            }
            other => panic!("Expected Init, got {other:?}"),
        }
    }

    #[test]
    fn check_takes_address() {
        let cli = Cli::parse_from_iter(["reachguard", "check", "example.com:8080"]);

        assert!(!cli.is_init());
        match cli.command {
            Some(Command::Check { address }) => assert_eq!(address, "example.com:8080"),
            other => panic!("Expected Check, got {other:?}"),
        }
    }

    #[test]
    fn global_url_after_subcommand() {
        let cli = Cli::parse_from_iter(["reachguard", "init", "--url", "https://example.com"]);

        assert!(cli.is_init());
        assert_eq!(cli.url.as_deref(), Some("https://example.com"));
    }
}
