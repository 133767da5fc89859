//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::core::BuildMode;

/// Kiln asset pipeline CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path, searched upward from the current directory
    #[arg(short = 'C', long, global = true, default_value = "kiln.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build all assets reachable from the entry
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Keep running and rebuild the affected assets on file changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Watch, rebuild and serve the output directory
    #[command(visible_alias = "s")]
    Serve {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<std::net::IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Shared build arguments for Build and Serve commands
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Build mode (default: prod for build, dev for serve)
    #[arg(short, long, value_enum)]
    pub mode: Option<BuildMode>,

    /// Clear the output and cache directories before building
    #[arg(short, long)]
    pub clean: bool,

    /// Number of worker threads (0 = available parallelism)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Stop scheduling new assets after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long)]
    pub verbose: bool,
}

impl Cli {
    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }

    pub const fn build_args(&self) -> &BuildArgs {
        match &self.command {
            Commands::Build { build_args, .. } | Commands::Serve { build_args, .. } => build_args,
        }
    }

    /// Effective build mode: explicit `--mode`, otherwise per command.
    pub fn mode(&self) -> BuildMode {
        self.build_args().mode.unwrap_or(if self.is_serve() {
            BuildMode::Development
        } else {
            BuildMode::Production
        })
    }
}
