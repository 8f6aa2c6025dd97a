//! User-facing notifications.
//!
//! The coordinator reports everything the user sees through a [`Notifier`]:
//! one-shot messages (title plus body, optionally carrying an action the user
//! can take) and a single in-place progress slot used while the archive
//! downloads.

use crate::utils::progress::ProgressBar;
use colored::Colorize;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info};

/// Action attached to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    /// Accepting the notification starts the pending update
    /// (see [`UpdateCoordinator::confirm_update`](crate::updater::UpdateCoordinator::confirm_update)).
    ConfirmUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub action: Option<NotificationAction>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            action: None,
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.body)
    }
}

/// Text shown in the progress slot.
pub fn progress_label(loaded: u64, total: Option<u64>) -> String {
    match total {
        Some(total) => format!("{loaded} of {total} bytes downloaded"),
        None => format!("{loaded} bytes downloaded"),
    }
}

/// Presents notifications and download progress to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    /// Replace the progress slot with the current byte counts.
    fn progress(&self, loaded: u64, total: Option<u64>);

    /// Remove the progress slot.
    fn clear_progress(&self);
}

/// Notifier printing colored messages to stderr with an indicatif bar.
pub struct ConsoleNotifier {
    show_progress: bool,
    slot: Mutex<Option<ProgressBar>>,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self {
            show_progress: true,
            slot: Mutex::new(None),
        }
    }

    /// Disable the progress bar (the `--no-progress` flag).
    #[must_use]
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    fn with_slot(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        match self.slot.lock() {
            Ok(mut slot) => f(&mut slot),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        debug!("Notification: {notification}");
        eprintln!("{} {}", notification.title.bold(), notification.body.dimmed());
        if notification.action == Some(NotificationAction::ConfirmUpdate) {
            eprintln!("  {} enter {} to install it", "→".cyan(), "confirm".bold());
        }
    }

    fn progress(&self, loaded: u64, total: Option<u64>) {
        let show = self.show_progress;
        self.with_slot(|slot| {
            let bar = slot.get_or_insert_with(|| {
                let bar = if show {
                    ProgressBar::new_download()
                } else {
                    ProgressBar::hidden()
                };
                bar.set_prefix("Downloading");
                bar
            });
            if let Some(total) = total {
                bar.set_length(total);
            }
            bar.set_position(loaded);
            bar.set_message(progress_label(loaded, total));
        });
    }

    fn clear_progress(&self) {
        self.with_slot(|slot| {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        });
    }
}

/// Notifier for headless installs: everything goes to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.action {
            Some(NotificationAction::ConfirmUpdate) => {
                info!("{notification} (awaiting confirmation)");
            }
            None => info!("{notification}"),
        }
    }

    fn progress(&self, loaded: u64, total: Option<u64>) {
        debug!("{}", progress_label(loaded, total));
    }

    fn clear_progress(&self) {}
}
