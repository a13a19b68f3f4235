//! Tests for CLI argument handling and command wiring.

use super::*;
use clap::Parser;
use tempfile::TempDir;

#[test]
fn header_arg_parses_name_and_value() {
    let pair = parse_header_arg("X-Demo: 1").unwrap();
    assert_eq!(pair.key, "X-Demo");
    assert_eq!(pair.value, "1");

    // Values may themselves contain colons.
    let pair = parse_header_arg("authorization: Bearer a:b:c").unwrap();
    assert_eq!(pair.value, "Bearer a:b:c");
}

#[test]
fn header_arg_without_colon_is_rejected() {
    assert!(matches!(
        parse_header_arg("not-a-header").unwrap_err(),
        CliError::InvalidArgument { .. }
    ));
    assert!(matches!(
        parse_header_arg(": empty-name").unwrap_err(),
        CliError::InvalidArgument { .. }
    ));
}

#[test]
fn template_arg_splits_provider_and_name() {
    assert_eq!(
        parse_template_arg("github/push").unwrap(),
        ("github".to_string(), "push".to_string())
    );
    assert!(parse_template_arg("no-slash").is_err());
    assert!(parse_template_arg("/missing-provider").is_err());
}

#[test]
fn cli_parses_listen_defaults() {
    let cli = Cli::parse_from(["better-webhook", "listen"]);

    match cli.command {
        Commands::Listen {
            host,
            port,
            max_body_bytes,
        } => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(port, 8787);
            assert_eq!(max_body_bytes, 10 * 1024 * 1024);
        }
        _ => panic!("expected listen command"),
    }
}

#[test]
fn cli_parses_replay_with_headers() {
    let cli = Cli::parse_from([
        "better-webhook",
        "replay",
        "abc123",
        "--target",
        "http://localhost:3000/hook",
        "-H",
        "X-Demo: 1",
        "-H",
        "X-Other: 2",
    ]);

    match cli.command {
        Commands::Replay {
            id,
            target,
            method,
            headers,
        } => {
            assert_eq!(id, "abc123");
            assert_eq!(target, "http://localhost:3000/hook");
            assert_eq!(method, None);
            assert_eq!(headers.len(), 2);
        }
        _ => panic!("expected replay command"),
    }
}

#[test]
fn cli_rejects_template_and_body_together() {
    let result = Cli::try_parse_from([
        "better-webhook",
        "send",
        "--url",
        "http://localhost:3000",
        "--template",
        "github/push",
        "--body",
        "{}",
    ]);

    assert!(result.is_err());
}

#[tokio::test]
async fn captures_list_runs_against_an_empty_store() {
    let dir = TempDir::new().unwrap();
    let cli = Cli {
        captures_dir: Some(dir.path().to_path_buf()),
        templates_dir: None,
        command: Commands::Captures {
            action: CaptureCommands::List { limit: 10 },
        },
    };

    run_command(cli).await.unwrap();
}

#[tokio::test]
async fn captures_show_for_missing_id_fails() {
    let dir = TempDir::new().unwrap();
    let cli = Cli {
        captures_dir: Some(dir.path().to_path_buf()),
        templates_dir: None,
        command: Commands::Captures {
            action: CaptureCommands::Show {
                id: "missing".to_string(),
            },
        },
    };

    assert!(matches!(
        run_command(cli).await.unwrap_err(),
        CliError::Captures(_)
    ));
}

#[tokio::test]
async fn templates_list_runs_against_an_empty_store() {
    let dir = TempDir::new().unwrap();
    let cli = Cli {
        captures_dir: None,
        templates_dir: Some(dir.path().to_path_buf()),
        command: Commands::Templates {
            action: TemplateCommands::List { provider: None },
        },
    };

    run_command(cli).await.unwrap();
}
