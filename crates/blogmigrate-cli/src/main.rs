//! blogmigrate - SQLite to PostgreSQL migration tool.

mod args;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use args::Args;

fn main() -> ExitCode {
    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blogmigrate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let format = args.format;
    let command = args.command.clone();
    let config = args.into_config();

    tracing::debug!(
        source = %config.source_path.display(),
        target = ?config.target,
        backup_dir = %config.backup_dir.display(),
        "configuration loaded"
    );

    match commands::run(command, config, format) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
