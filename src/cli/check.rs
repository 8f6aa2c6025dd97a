//! One manual update check.

use super::CliConfig;
use super::common::CommandContext;
use crate::updater::{CheckOutcome, PatchOutcome};
use anyhow::{Result, anyhow};
use clap::Args;
use colored::Colorize;

/// Check for an update now.
///
/// A manual check installs a new version without asking. The command exits
/// with a non-zero status when the check or the install failed.
#[derive(Args)]
pub struct CheckCommand {
    /// Use the log instead of the console for notifications
    #[arg(long)]
    headless: bool,
}

impl CheckCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let context = CommandContext::load(cli).await?;
        let notifier = if self.headless {
            context.log_notifier()
        } else {
            context.console_notifier()
        };
        let coordinator = context.coordinator(notifier)?;

        match coordinator.check_for_update(true).await {
            CheckOutcome::Patched(PatchOutcome::Installed { version, files }) => {
                println!("{} Updated to {version} ({files} files)", "✓".green());
                Ok(())
            }
            CheckOutcome::UpToDate { version } => {
                println!("{} Up to date ({version})", "✓".green());
                Ok(())
            }
            CheckOutcome::NoDescriptor => {
                println!("No version is published in the catalog");
                Ok(())
            }
            CheckOutcome::AwaitingConfirmation { target_version } => {
                println!("Version {target_version} is available");
                Ok(())
            }
            CheckOutcome::Skipped(reason) => Err(anyhow!("Update check skipped: {reason}")),
            CheckOutcome::Patched(PatchOutcome::DownloadFailed(e) | PatchOutcome::InstallFailed(e))
            | CheckOutcome::Failed(e) => Err(e.into()),
        }
    }
}
