//! VoiceStack worker.
//!
//! Runs the transcription pipeline over queued jobs and exposes the job and
//! speaker operations an API layer would call.
//!
//! Usage:
//!   voicestack-worker enqueue talk.mp4
//!   voicestack-worker run --once
//!   voicestack-worker status <job-id>
//!   voicestack-worker speakers merge <source-id> <target-id>

mod cli;
mod commands;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use voicestack_core::config::ConfigManager;
use voicestack_core::logging::{init_tracing, init_tracing_with_file, LogLevel};
use voicestack_core::store::Catalog;

use cli::{Cli, Commands};
use commands::App;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = ConfigManager::new(&cli.config);
    config
        .load_or_create()
        .with_context(|| format!("cannot load settings from {}", cli.config.display()))?;
    config
        .ensure_dirs_exist()
        .context("cannot create data directories")?;
    let settings = config.settings().clone();

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(settings.logging.level.as_str())
        .parse::<LogLevel>()
        .unwrap_or(LogLevel::Info);

    // Only the long-running worker writes the rolling application log.
    let _log_guard = match cli.command {
        Commands::Run { .. } => Some(
            init_tracing_with_file(level, &settings.paths.logs_dir())
                .context("cannot open the application log")?,
        ),
        _ => {
            init_tracing(level);
            None
        }
    };

    let catalog_path = settings.paths.catalog_path();
    let catalog = Catalog::open(&catalog_path, &settings.paths.leases_dir())
        .with_context(|| format!("cannot open catalog {}", catalog_path.display()))?;

    let app = App {
        settings,
        config_path: cli.config,
        catalog: Arc::new(catalog),
        json: cli.json,
    };
    app.dispatch(cli.command)
}
