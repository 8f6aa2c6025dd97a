//! Show or initialize the configuration file.

use super::CliConfig;
use crate::config::UpdaterConfig;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct ConfigCommand {
    /// Write an example configuration file
    #[arg(long)]
    init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    force: bool,
}

impl ConfigCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let path = match cli.config_path.clone() {
            Some(path) => path,
            None => UpdaterConfig::default_path()?,
        };

        if self.init {
            if path.exists() && !self.force {
                println!("❌ Configuration already exists at: {}", path.display());
                println!("   Use --force to overwrite");
                return Ok(());
            }

            let config = UpdaterConfig::init_example();
            config.save_to(&path).await?;
            println!("✅ Created configuration at: {}", path.display());
            println!("\n{}", "Example configuration:".bold());
            println!("{}", toml::to_string_pretty(&config)?);
            println!("\n{}", "Next steps:".yellow());
            println!("  1. Point [catalog] at the bucket (or directory) updates are published to");
            println!("  2. Set install_path to the application's install directory");
            return Ok(());
        }

        let config = UpdaterConfig::load_with_optional(Some(path.clone())).await?;
        println!("{}", "Effective configuration".bold());
        if path.exists() {
            println!("Location: {}\n", path.display());
        } else {
            println!("Location: {} {}\n", path.display(), "(not found, showing defaults)".dimmed());
        }
        println!("{}", toml::to_string_pretty(&config)?);
        Ok(())
    }
}
