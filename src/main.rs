//! pgstash binary entrypoint.

use std::process::ExitCode;

use clap::Parser;

use pgstash::config::Config;
use pgstash::{runner, ui};

/// Back up PostgreSQL databases to S3-compatible object storage and prune
/// aged backups. All settings come from the environment; run under a
/// scheduler that serializes invocations.
#[derive(Debug, Parser)]
#[command(name = "pgstash", version, about)]
struct Args {}

#[tokio::main]
async fn main() -> ExitCode {
    let _args = Args::parse();
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            ui::print_error_box("Configuration error", &e.to_string());
            return ExitCode::FAILURE;
        },
    };
    config.log_summary();

    match runner::execute(&config).await {
        Ok(()) => {
            tracing::info!("backup run finished");
            ExitCode::SUCCESS
        },
        Err(e) => {
            ui::print_error_box("Backup run failed", &e.to_string());
            ExitCode::FAILURE
        },
    }
}

/// Initialize stdout logging, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
