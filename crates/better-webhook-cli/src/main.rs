use better_webhook_cli::run_cli;
use tracing::error;

#[tokio::main]
async fn main() {
    // Structured logging to stdout, level controlled by RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run_cli().await {
        error!("{}", e);
        eprintln!("Error: {}", e);

        let exit_code = match e {
            better_webhook_cli::CliError::InvalidArgument { .. } => 2,
            better_webhook_cli::CliError::Captures(_) => 3,
            better_webhook_cli::CliError::Templates(_) => 4,
            better_webhook_cli::CliError::Dispatch(_) => 5,
            better_webhook_cli::CliError::Server(_) => 6,
            better_webhook_cli::CliError::Io(_) => 7,
        };
        std::process::exit(exit_code);
    }
}
