//! Kiln - an incremental asset pipeline.

mod cache;
mod cli;
mod config;
mod core;
mod embed;
mod emit;
mod freshness;
mod graph;
mod logger;
mod plugin;
mod scheduler;
mod transform;
mod utils;
mod watch;

use std::process::ExitCode;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands, build::build_command, serve::serve_command};
use config::KilnConfig;

fn main() -> Result<ExitCode> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = KilnConfig::load(&cli)?;
    let mode = cli.mode();
    debug!("config"; "{}", config.config_path.display());

    let ok = match &cli.command {
        Commands::Build { watch, .. } => build_command(config, mode, *watch)?,
        Commands::Serve { .. } => serve_command(config, mode)?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
