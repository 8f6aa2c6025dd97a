//! Wiring shared by the commands: configuration loading and coordinator
//! construction.

use super::CliConfig;
use crate::catalog;
use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::notify::{ConsoleNotifier, LogNotifier, Notifier};
use crate::signal::FileSignalChannel;
use crate::updater::UpdateCoordinator;
use crate::updater::version::read_installed_version;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Configuration plus the values resolved from it and the command line.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: UpdaterConfig,
    pub config_path: Option<PathBuf>,
    pub install_path: PathBuf,
    pub no_progress: bool,
}

impl CommandContext {
    pub async fn load(cli: &CliConfig) -> Result<Self> {
        let config = UpdaterConfig::load_with_optional(cli.config_path.clone()).await?;
        let install_path = config.resolve_install_path(cli.install_path.as_deref())?;
        if !install_path.is_dir() {
            return Err(UpdateError::Config {
                message: format!("install path {} is not a directory", install_path.display()),
            }
            .into());
        }
        debug!("Install path: {}", install_path.display());

        Ok(Self {
            config,
            config_path: cli.config_path.clone(),
            install_path,
            no_progress: cli.no_progress,
        })
    }

    /// Build a coordinator talking to the configured catalog and companion.
    pub fn coordinator(&self, notifier: Arc<dyn Notifier>) -> Result<UpdateCoordinator> {
        let catalog = catalog::from_config(&self.config.catalog, self.config.request_timeout())
            .context("Failed to set up the update catalog")?;
        let signal = Arc::new(FileSignalChannel::new(self.config.ipc_dir()?));

        Ok(UpdateCoordinator::new(catalog, signal, notifier, &self.install_path)
            .configure(&self.config))
    }

    /// Notifier for interactive commands.
    pub fn console_notifier(&self) -> Arc<dyn Notifier> {
        let notifier = ConsoleNotifier::new();
        if self.no_progress {
            Arc::new(notifier.without_progress())
        } else {
            Arc::new(notifier)
        }
    }

    /// Notifier for unattended runs.
    pub fn log_notifier(&self) -> Arc<dyn Notifier> {
        Arc::new(LogNotifier)
    }

    /// Installed version, or a placeholder when the marker is unreadable.
    pub async fn installed_version_label(&self) -> String {
        match read_installed_version(&self.install_path).await {
            Ok(version) if version.is_empty() => "(empty marker)".dimmed().to_string(),
            Ok(version) => version,
            Err(e) => {
                debug!("{e}");
                "unknown".yellow().to_string()
            }
        }
    }
}
