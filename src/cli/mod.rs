//! Command-line interface for kiosk-updater.
//!
//! # Commands
//!
//! - `run` - Host the update agent: periodic checks plus commands on stdin
//! - `check` - One manual check, installing a new version straight away
//! - `status` - Show the installed version and updater settings
//! - `config` - Show the effective configuration or write an example file
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: warnings and errors only
//! - `--config` / `-c`: configuration file path
//! - `--install-path`: install directory, overriding the configuration
//! - `--no-progress`: hide the download progress bar
//!
//! `RUST_LOG` overrides the level chosen by `--verbose`/`--quiet`.
//!
//! # Examples
//!
//! ```bash
//! # Check once and install if needed
//! kiosk-updater check
//!
//! # Run the agent against a local mirror
//! kiosk-updater --config ./mirror.toml run
//!
//! # Write an example configuration
//! kiosk-updater config --init
//! ```

mod check;
pub mod common;
mod config;
mod run;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Options shared by every command, derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log level when `RUST_LOG` is not set.
    pub log_level: String,
    pub no_progress: bool,
    pub config_path: Option<PathBuf>,
    pub install_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            ..Self::default()
        }
    }
}

#[derive(Parser)]
#[command(
    name = "kiosk-updater",
    about = "Self-update agent for kiosk applications",
    version,
    long_about = "kiosk-updater checks an S3-style catalog for a newer published version of an \
                  installed application and applies the patch archive over the install directory."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "KIOSK_UPDATER_CONFIG")]
    config: Option<PathBuf>,

    /// Install directory (defaults to the configured one, then the executable's directory)
    #[arg(long, global = true)]
    install_path: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the update agent until stdin closes or Ctrl-C
    Run(run::RunCommand),

    /// Check for an update now and install it if one is found
    Check(check::CheckCommand),

    /// Show the installed version and updater settings
    Status(status::StatusCommand),

    /// Show or initialize the configuration file
    Config(config::ConfigCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        };

        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
            install_path: self.install_path.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute(&config).await,
            Commands::Check(cmd) => cmd.execute(&config).await,
            Commands::Status(cmd) => cmd.execute(&config).await,
            Commands::Config(cmd) => cmd.execute(&config).await,
        }
    }
}
