//! # better-webhook CLI
//!
//! Command-line interface for the better-webhook toolkit.
//!
//! This module provides CLI commands for:
//! - Running the local capture server
//! - Listing, inspecting, and deleting captures
//! - Replaying captures against developer endpoints
//! - Sending synthetic, signed webhooks from templates or ad-hoc bodies
//!
//! All logic lives in the library crates; the CLI is thin wiring.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use better_webhook_capture::detect::ProviderDetector;
use better_webhook_capture::dispatch::{ReplayDispatcher, ReplayOptions};
use better_webhook_capture::executor::{Executor, SendRequest};
use better_webhook_capture::record::HeaderPair;
use better_webhook_capture::server::{start_capture_server, CaptureServerConfig};
use better_webhook_capture::store::{default_captures_dir, CaptureStore};
use better_webhook_capture::templates::{default_templates_dir, TemplateStore};

// ============================================================================
// CLI Structure
// ============================================================================

/// better-webhook - local-first webhook development toolkit
#[derive(Parser)]
#[command(name = "better-webhook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Capture, replay, and send webhooks locally")]
pub struct Cli {
    /// Capture directory
    #[arg(long, global = true, env = "BETTER_WEBHOOK_CAPTURES_DIR")]
    pub captures_dir: Option<PathBuf>,

    /// Template directory
    #[arg(long, global = true, env = "BETTER_WEBHOOK_TEMPLATES_DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the capture server
    Listen {
        /// Host to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind (0 selects an ephemeral port)
        #[arg(short, long, default_value = "8787")]
        port: u16,

        /// Maximum accepted body size in bytes
        #[arg(long, default_value = "10485760")]
        max_body_bytes: usize,
    },

    /// Capture management commands
    Captures {
        #[command(subcommand)]
        action: CaptureCommands,
    },

    /// Replay a capture against a target URL
    Replay {
        /// Capture id (full, prefix, or filename fragment)
        id: String,

        /// Target URL to replay against
        #[arg(short, long)]
        target: String,

        /// Method override
        #[arg(short, long)]
        method: Option<String>,

        /// Header override, `name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Send a synthetic webhook
    Send {
        /// Target URL
        #[arg(short, long)]
        url: String,

        /// Provider whose conventions to imitate
        #[arg(long)]
        provider: Option<String>,

        /// Signing secret
        #[arg(long, env = "WEBHOOK_SECRET")]
        secret: Option<String>,

        /// Template to send, as `provider/name`
        #[arg(short, long, conflicts_with = "body")]
        template: Option<String>,

        /// Inline JSON body
        #[arg(short, long)]
        body: Option<String>,

        /// Header override, `name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Template commands
    Templates {
        #[command(subcommand)]
        action: TemplateCommands,
    },
}

/// Capture store subcommands
#[derive(Subcommand)]
pub enum CaptureCommands {
    /// List recent captures
    List {
        /// Maximum entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one capture as JSON
    Show {
        /// Capture id (full, prefix, or filename fragment)
        id: String,
    },

    /// Search captures by id, path, method, provider, or filename
    Search {
        /// Case-insensitive query
        query: String,
    },

    /// Delete one capture
    Delete {
        /// Capture id (full, prefix, or filename fragment)
        id: String,
    },

    /// Delete every capture
    Clear,
}

/// Template subcommands
#[derive(Subcommand)]
pub enum TemplateCommands {
    /// List stored templates
    List {
        /// Restrict to one provider
        #[arg(long)]
        provider: Option<String>,
    },
}

// ============================================================================
// Errors
// ============================================================================

/// Top-level CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Capture store error: {0}")]
    Captures(#[from] better_webhook_capture::store::CaptureStoreError),

    #[error("Template error: {0}")]
    Templates(#[from] better_webhook_capture::templates::TemplateError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] better_webhook_capture::dispatch::DispatchError),

    #[error("Server error: {0}")]
    Server(#[from] better_webhook_capture::server::CaptureServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a `name: value` header argument.
pub fn parse_header_arg(raw: &str) -> Result<HeaderPair, CliError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| CliError::InvalidArgument {
            arg: "header".to_string(),
            message: format!("expected 'name: value', got '{}'", raw),
        })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "header".to_string(),
            message: "header name must not be empty".to_string(),
        });
    }
    Ok(HeaderPair::new(name, value.trim()))
}

/// Parse a `provider/name` template reference.
pub fn parse_template_arg(raw: &str) -> Result<(String, String), CliError> {
    match raw.split_once('/') {
        Some((provider, name)) if !provider.is_empty() && !name.is_empty() => {
            Ok((provider.to_string(), name.to_string()))
        }
        _ => Err(CliError::InvalidArgument {
            arg: "template".to_string(),
            message: format!("expected 'provider/name', got '{}'", raw),
        }),
    }
}

fn captures_dir(cli_dir: Option<PathBuf>) -> PathBuf {
    cli_dir.unwrap_or_else(default_captures_dir)
}

async fn open_store(cli_dir: Option<PathBuf>) -> Result<CaptureStore, CliError> {
    Ok(CaptureStore::new(captures_dir(cli_dir)).await?)
}

// ============================================================================
// Entry point
// ============================================================================

/// Parse arguments and execute the selected command.
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    run_command(cli).await
}

/// Execute an already-parsed CLI invocation.
pub async fn run_command(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Listen {
            host,
            port,
            max_body_bytes,
        } => execute_listen(cli.captures_dir, host, port, max_body_bytes).await,
        Commands::Captures { action } => execute_captures(cli.captures_dir, action).await,
        Commands::Replay {
            id,
            target,
            method,
            headers,
        } => execute_replay(cli.captures_dir, id, target, method, headers).await,
        Commands::Send {
            url,
            provider,
            secret,
            template,
            body,
            headers,
        } => {
            execute_send(
                cli.templates_dir,
                url,
                provider,
                secret,
                template,
                body,
                headers,
            )
            .await
        }
        Commands::Templates { action } => execute_templates(cli.templates_dir, action).await,
    }
}

// ============================================================================
// Command execution
// ============================================================================

async fn execute_listen(
    dir: Option<PathBuf>,
    host: String,
    port: u16,
    max_body_bytes: usize,
) -> Result<(), CliError> {
    let store = open_store(dir).await?;
    info!(dir = %store.dir().display(), "storing captures");

    let handle = start_capture_server(
        CaptureServerConfig {
            host,
            port,
            max_body_bytes,
        },
        store,
        ProviderDetector::with_defaults(),
    )
    .await?;

    println!("Capturing webhooks on http://{}", handle.addr());
    println!("Press Ctrl+C to stop");

    let mut events = handle.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down capture server");
                handle.stop().await?;
                return Ok(());
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    println!(
                        "{} {} {} -> {} ({})",
                        event.capture.timestamp.format("%H:%M:%S"),
                        event.capture.method,
                        event.capture.path,
                        event.capture.provider.as_deref().unwrap_or("unknown"),
                        event.capture.id
                    );
                }
            }
        }
    }
}

async fn execute_captures(dir: Option<PathBuf>, action: CaptureCommands) -> Result<(), CliError> {
    let store = open_store(dir).await?;
    match action {
        CaptureCommands::List { limit } => {
            let entries = store.list(Some(limit)).await?;
            if entries.is_empty() {
                println!("No captures");
                return Ok(());
            }
            for entry in entries {
                println!(
                    "{}  {:6} {:30} {:10} {}",
                    entry.capture.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.capture.method,
                    entry.capture.path,
                    entry.capture.provider.as_deref().unwrap_or("-"),
                    entry.capture.id
                );
            }
        }
        CaptureCommands::Show { id } => {
            let entry = store.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&entry.capture).unwrap_or_default());
        }
        CaptureCommands::Search { query } => {
            let entries = store.search(&query).await?;
            println!("{} match(es)", entries.len());
            for entry in entries {
                println!("{}  {}", entry.capture.id, entry.file);
            }
        }
        CaptureCommands::Delete { id } => {
            let removed = store.delete(&id).await?;
            println!("Deleted {}", removed.file);
        }
        CaptureCommands::Clear => {
            let removed = store.delete_all().await?;
            println!("Deleted {} capture(s)", removed);
        }
    }
    Ok(())
}

async fn execute_replay(
    dir: Option<PathBuf>,
    id: String,
    target: String,
    method: Option<String>,
    headers: Vec<String>,
) -> Result<(), CliError> {
    let store = std::sync::Arc::new(open_store(dir).await?);

    let mut options = ReplayOptions::new(target);
    options.method = method;
    options.headers = headers
        .iter()
        .map(|raw| parse_header_arg(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = ReplayDispatcher::new(store).replay(&id, options).await?;
    println!(
        "{} {} in {}ms",
        outcome.status,
        outcome.status_text,
        outcome.duration.as_millis()
    );
    if !outcome.body_text.is_empty() {
        println!("{}", outcome.body_text);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn execute_send(
    templates_dir: Option<PathBuf>,
    url: String,
    provider: Option<String>,
    secret: Option<String>,
    template: Option<String>,
    body: Option<String>,
    headers: Vec<String>,
) -> Result<(), CliError> {
    let mut request = SendRequest::new(url);
    request.secret = secret;

    let mut header_pairs = headers
        .iter()
        .map(|raw| parse_header_arg(raw))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(template_ref) = template {
        let (template_provider, name) = parse_template_arg(&template_ref)?;
        let store = TemplateStore::new(templates_dir.unwrap_or_else(default_templates_dir));
        let template = store.get(&template_provider, &name).await?;

        request.provider = provider.or(Some(template.provider));
        request.method = template.method;
        request.body = Some(template.body);
        let mut template_headers = template.headers;
        template_headers.append(&mut header_pairs);
        request.headers = template_headers;
    } else {
        request.provider = provider;
        request.headers = header_pairs;
        request.body = match body {
            Some(raw) => Some(serde_json::from_str::<Value>(&raw).map_err(|e| {
                CliError::InvalidArgument {
                    arg: "body".to_string(),
                    message: format!("invalid JSON: {}", e),
                }
            })?),
            None => None,
        };
    }

    let outcome = Executor::new().send(request).await?;
    println!(
        "{} {} in {}ms",
        outcome.status,
        outcome.status_text,
        outcome.duration.as_millis()
    );
    if !outcome.body_text.is_empty() {
        println!("{}", outcome.body_text);
    }
    Ok(())
}

async fn execute_templates(
    dir: Option<PathBuf>,
    action: TemplateCommands,
) -> Result<(), CliError> {
    let store = TemplateStore::new(dir.unwrap_or_else(default_templates_dir));
    match action {
        TemplateCommands::List { provider } => {
            let templates = match provider {
                Some(provider) => store.list_provider(&provider).await?,
                None => store.list().await?,
            };
            if templates.is_empty() {
                println!("No templates");
                return Ok(());
            }
            for template in templates {
                println!("{}/{}", template.provider, template.name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
