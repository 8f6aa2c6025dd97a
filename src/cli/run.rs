//! Host the update agent.
//!
//! Starts the periodic scheduler and reads one command per line from stdin,
//! standing in for the host application's menu:
//!
//! | Command   | Effect |
//! |-----------|--------|
//! | `check`   | Manual check (installs straight away when a new version exists) |
//! | `confirm` | Accept the pending update prompt |
//! | `enable`  | Allow automatic checks |
//! | `disable` | Stop automatic checks |
//! | `status`  | Print the coordinator state |
//! | `quit`    | Exit once no install is in progress |
//!
//! Ctrl-C behaves like `quit`. Before exiting, the timer is stopped and
//! every check or install already under way is allowed to finish, so a
//! download never leaves a partial archive behind and a companion that was
//! told to exit always gets its update. End of input also quits, except
//! with `--headless`, where the agent keeps running until interrupted.

use super::CliConfig;
use super::common::CommandContext;
use super::status::{print_settings, print_snapshot};
use crate::updater::{UpdateCoordinator, scheduler};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Args)]
pub struct RunCommand {
    /// Send notifications to the log instead of the console
    #[arg(long)]
    headless: bool,

    /// Enable automatic checks regardless of the configuration
    #[arg(long)]
    enable: bool,
}

/// A line of input from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Check,
    Confirm,
    Enable,
    Disable,
    Status,
    Quit,
    Help,
}

impl FromStr for HostCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "check" => Ok(Self::Check),
            "confirm" | "update" => Ok(Self::Confirm),
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            "status" => Ok(Self::Status),
            "quit" | "exit" => Ok(Self::Quit),
            "help" | "?" => Ok(Self::Help),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

impl RunCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let context = CommandContext::load(cli).await?;
        let notifier = if self.headless {
            context.log_notifier()
        } else {
            context.console_notifier()
        };
        let coordinator = Arc::new(context.coordinator(notifier)?);
        if self.enable {
            coordinator.set_enabled(true);
        }

        let update = &context.config.update;
        let scheduled = update
            .check_interval()
            .map(|period| scheduler::spawn(coordinator.clone(), period, update.check_on_startup));

        info!("Update agent running for {}", context.install_path.display());
        if !self.headless {
            print_help();
        }

        let mut tasks = JoinSet::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        loop {
            tokio::select! {
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        warn!("Update task failed: {e}");
                    }
                }
                line = lines.next_line(), if stdin_open => {
                    let Some(line) = line.context("Failed to read from stdin")? else {
                        // Services often run with stdin closed; keep going until Ctrl-C.
                        if self.headless {
                            stdin_open = false;
                            continue;
                        }
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<HostCommand>() {
                        Ok(HostCommand::Quit) => break,
                        Ok(command) => dispatch(command, &coordinator, &context, &mut tasks).await,
                        Err(e) => eprintln!("{} {e} (try 'help')", "?".yellow()),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        if coordinator.state().is_patching() {
            warn!("An update is being installed; waiting for it to finish before exiting");
        }
        if let Some(scheduled) = scheduled {
            scheduled.stop().await;
        }
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                warn!("Update task failed: {e}");
            }
        }

        let blocker = coordinator.shutdown_blocker();
        if blocker.is_blocked() {
            warn!("An update is being installed; waiting for it to finish before exiting");
            blocker.wait_released().await;
        }
        Ok(())
    }
}

async fn dispatch(
    command: HostCommand,
    coordinator: &Arc<UpdateCoordinator>,
    context: &CommandContext,
    tasks: &mut JoinSet<()>,
) {
    match command {
        HostCommand::Check => {
            let coordinator = coordinator.clone();
            tasks.spawn(async move {
                coordinator.check_for_update(true).await;
            });
        }
        HostCommand::Confirm => {
            let coordinator = coordinator.clone();
            tasks.spawn(async move {
                if let Err(rejection) = coordinator.confirm_update().await {
                    eprintln!("{} {rejection}", "!".yellow());
                }
            });
        }
        HostCommand::Enable => coordinator.set_enabled(true),
        HostCommand::Disable => coordinator.set_enabled(false),
        HostCommand::Status => {
            print_settings(context).await;
            print_snapshot(&coordinator.status());
        }
        HostCommand::Help => print_help(),
        HostCommand::Quit => {}
    }
}

fn print_help() {
    eprintln!(
        "{} check | confirm | enable | disable | status | quit",
        "Commands:".bold()
    );
}
