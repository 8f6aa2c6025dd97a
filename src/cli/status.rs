//! Show the installed version and updater settings.

use super::CliConfig;
use super::common::CommandContext;
use crate::updater::StatusSnapshot;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let context = CommandContext::load(cli).await?;
        print_settings(&context).await;
        Ok(())
    }
}

/// Print the static view: what is installed and where updates come from.
pub async fn print_settings(context: &CommandContext) {
    let config = &context.config;
    println!("{}", config.product_name.bold());
    println!("  Installed version: {}", context.installed_version_label().await);
    println!("  Install path:      {}", context.install_path.display());
    println!("  Catalog:           {}", config.catalog.location());
    println!(
        "  Automatic checks:  {}",
        if config.update.enabled {
            format!("every {}s", config.update.check_interval).green()
        } else {
            "disabled".yellow()
        }
    );
    println!("  Companion:         {}", config.companion.process_name);
}

/// Print the live view of a running coordinator.
pub fn print_snapshot(snapshot: &StatusSnapshot) {
    println!("  State:             {}", snapshot.state.to_string().cyan());
    println!(
        "  Automatic checks:  {}",
        if snapshot.enabled {
            "enabled".green()
        } else {
            "disabled".yellow()
        }
    );
    if snapshot.manual_invoke {
        println!("  Manual check pending");
    }
}
