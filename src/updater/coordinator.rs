//! The update coordinator.
//!
//! [`UpdateCoordinator`] drives one update cycle at a time:
//!
//! ```text
//! trigger ─► check version ─► (nothing | prompt | patch)
//!                                               │
//!            download ─► signal exit ─► grace delay ─► extract ─► notify done
//! ```
//!
//! All mutable state lives behind one mutex that is never held across an
//! `.await`. A caller that finds the state incompatible with what it wants
//! to do gives up immediately; nothing is queued or retried.

use super::installer;
use super::shutdown::ShutdownBlocker;
use super::state::{Rejection, Transition, UpdateState};
use super::version::{is_update_available, normalize_descriptor, read_installed_version};
use crate::catalog::RemoteCatalog;
use crate::config::UpdaterConfig;
use crate::constants::{DEFAULT_COMPANION_PROCESS, EXIT_SIGNAL, PATCH_KEY, VERSION_KEY};
use crate::core::UpdateError;
use crate::notify::{Notification, NotificationAction, Notifier};
use crate::signal::SignalChannel;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_PRODUCT_NAME: &str = "The application";

/// Why a check did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A patch is downloading or installing, or a confirmed patch took over
    /// the check.
    Patching,
    /// Automatic checks are disabled and the check was not manual.
    Disabled,
    /// Another check is still in flight.
    AlreadyChecking,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patching => f.write_str("an update is being installed"),
            Self::Disabled => f.write_str("automatic checks are disabled"),
            Self::AlreadyChecking => f.write_str("a check is already running"),
        }
    }
}

/// Result of a patch attempt that was allowed to start.
#[derive(Debug)]
pub enum PatchOutcome {
    /// The archive was extracted and removed.
    Installed { version: String, files: usize },
    /// The archive could not be downloaded; the install directory is untouched.
    DownloadFailed(UpdateError),
    /// Extraction or archive removal failed after the companion was stopped.
    InstallFailed(UpdateError),
}

impl PatchOutcome {
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }

    pub const fn error(&self) -> Option<&UpdateError> {
        match self {
            Self::Installed { .. } => None,
            Self::DownloadFailed(e) | Self::InstallFailed(e) => Some(e),
        }
    }
}

/// What a call to [`UpdateCoordinator::check_for_update`] did.
#[derive(Debug)]
pub enum CheckOutcome {
    Skipped(SkipReason),
    /// The catalog has no version descriptor.
    NoDescriptor,
    UpToDate { version: String },
    /// The user has been asked to confirm the update.
    AwaitingConfirmation { target_version: String },
    /// A manual check found a new version and patched straight away.
    Patched(PatchOutcome),
    /// The check itself failed.
    Failed(UpdateError),
}

impl CheckOutcome {
    /// Whether the cycle ended in an error.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        match self {
            Self::Failed(_) => true,
            Self::Patched(outcome) => !outcome.is_installed(),
            _ => false,
        }
    }
}

/// Point-in-time view of the coordinator, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: UpdateState,
    pub enabled: bool,
    pub manual_invoke: bool,
    pub install_path: PathBuf,
}

#[derive(Debug, Default)]
struct Inner {
    state: UpdateState,
    enabled: bool,
    manual_invoke: bool,
}

/// Orchestrates version checks and patch installation.
pub struct UpdateCoordinator {
    catalog: Arc<dyn RemoteCatalog>,
    signal: Arc<dyn SignalChannel>,
    notifier: Arc<dyn Notifier>,
    install_path: PathBuf,
    product_name: String,
    companion: String,
    grace_delay: Duration,
    shutdown: ShutdownBlocker,
    inner: Mutex<Inner>,
}

impl UpdateCoordinator {
    /// Create a coordinator with automatic checks disabled.
    pub fn new(
        catalog: Arc<dyn RemoteCatalog>,
        signal: Arc<dyn SignalChannel>,
        notifier: Arc<dyn Notifier>,
        install_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            signal,
            notifier,
            install_path: install_path.into(),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            companion: DEFAULT_COMPANION_PROCESS.to_string(),
            grace_delay: crate::constants::default_grace_delay(),
            shutdown: ShutdownBlocker::new(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Apply product name, companion, grace delay, and the enabled flag
    /// from a loaded configuration.
    #[must_use]
    pub fn configure(self, config: &UpdaterConfig) -> Self {
        self.with_product_name(config.product_name.clone())
            .with_companion(config.companion.process_name.clone())
            .with_grace_delay(config.update.grace_delay())
            .enabled(config.update.enabled)
    }

    #[must_use]
    pub fn with_grace_delay(mut self, delay: Duration) -> Self {
        self.grace_delay = delay;
        self
    }

    #[must_use]
    pub fn with_companion(mut self, process_name: impl Into<String>) -> Self {
        self.companion = process_name.into();
        self
    }

    /// Share an existing blocker with the host.
    #[must_use]
    pub fn with_shutdown_blocker(mut self, blocker: ShutdownBlocker) -> Self {
        self.shutdown = blocker;
        self
    }

    #[must_use]
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    #[must_use]
    pub fn enabled(self, enabled: bool) -> Self {
        self.lock().enabled = enabled;
        self
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn shutdown_blocker(&self) -> &ShutdownBlocker {
        &self.shutdown
    }

    /// Permit or forbid timer-driven checks. Manual checks are unaffected.
    pub fn set_enabled(&self, enabled: bool) {
        self.lock().enabled = enabled;
        info!("Automatic update checks {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn state(&self) -> UpdateState {
        self.lock().state.clone()
    }

    pub fn status(&self) -> StatusSnapshot {
        let inner = self.lock();
        StatusSnapshot {
            state: inner.state.clone(),
            enabled: inner.enabled,
            manual_invoke: inner.manual_invoke,
            install_path: self.install_path.clone(),
        }
    }

    /// Run one version check.
    ///
    /// A manual check always announces itself (unless a patch is running),
    /// reports its outcome, and patches without asking when a new version is
    /// found. An automatic check stays silent unless it has something to
    /// offer, in which case it asks for confirmation through the notifier.
    pub async fn check_for_update(&self, manual: bool) -> CheckOutcome {
        let admitted = {
            let mut inner = self.lock();
            if inner.state.is_patching() {
                debug!("Update check ignored: {}", SkipReason::Patching);
                return CheckOutcome::Skipped(SkipReason::Patching);
            }
            if manual {
                inner.manual_invoke = true;
            }
            if !inner.enabled && !manual {
                Err(SkipReason::Disabled)
            } else {
                match inner.state.apply(Transition::StartCheck) {
                    Ok(next) => {
                        inner.state = next;
                        Ok(())
                    }
                    Err(_) => Err(SkipReason::AlreadyChecking),
                }
            }
        };

        if manual {
            self.notifier
                .notify(Notification::new("Checking for updates", "Please wait"));
        }
        if let Err(reason) = admitted {
            debug!("Update check skipped: {reason}");
            return CheckOutcome::Skipped(reason);
        }

        info!("Checking for updates");
        self.run_check().await
    }

    async fn run_check(&self) -> CheckOutcome {
        let keys = match self.catalog.list_keys().await {
            Ok(keys) => keys,
            Err(source) => return self.check_failed(UpdateError::CatalogList(source)),
        };

        if !keys.iter().any(|entry| entry.key == VERSION_KEY) {
            debug!("No version descriptor published at {VERSION_KEY}");
            if !Self::leave_check(&mut self.lock(), Transition::FinishCheck) {
                return CheckOutcome::Skipped(SkipReason::Patching);
            }
            return CheckOutcome::NoDescriptor;
        }

        let descriptor = match self.catalog.read_text_key(VERSION_KEY).await {
            Ok(text) => text,
            Err(source) => {
                return self.check_failed(UpdateError::CatalogRead {
                    key: VERSION_KEY.to_string(),
                    source,
                });
            }
        };
        let target_version = normalize_descriptor(&descriptor).to_string();

        let current_version = match read_installed_version(&self.install_path).await {
            Ok(version) => version,
            Err(e) => return self.check_failed(e),
        };
        debug!("Installed version '{current_version}', published version '{target_version}'");

        if !is_update_available(&current_version, &target_version) {
            let was_manual = {
                let mut inner = self.lock();
                if !Self::leave_check(&mut inner, Transition::FinishCheck) {
                    return CheckOutcome::Skipped(SkipReason::Patching);
                }
                std::mem::take(&mut inner.manual_invoke)
            };
            if was_manual {
                self.notifier.notify(Notification::new(
                    format!("{} is up to date", self.product_name),
                    format!("Current version: {current_version}"),
                ));
            }
            info!("Already on published version {current_version}");
            return CheckOutcome::UpToDate {
                version: current_version,
            };
        }

        info!("New version available: {current_version} -> {target_version}");
        let manual = {
            let mut inner = self.lock();
            let manual = inner.manual_invoke;
            let transition = if manual {
                Transition::ApplyDetected(target_version.clone())
            } else {
                Transition::AwaitConfirmation(target_version.clone())
            };
            if !Self::leave_check(&mut inner, transition) {
                return CheckOutcome::Skipped(SkipReason::Patching);
            }
            manual
        };

        if manual {
            CheckOutcome::Patched(self.run_patch(target_version).await)
        } else {
            self.notifier.notify(
                Notification::new(
                    format!("A new version of {} is available", self.product_name),
                    "Click here to update",
                )
                .with_action(NotificationAction::ConfirmUpdate),
            );
            CheckOutcome::AwaitingConfirmation { target_version }
        }
    }

    /// The manual flag survives a failed check, so the next check to
    /// complete still reports as manual.
    fn check_failed(&self, error: UpdateError) -> CheckOutcome {
        warn!("Update check failed: {error}");
        let report = {
            let mut inner = self.lock();
            Self::leave_check(&mut inner, Transition::Abort) && inner.manual_invoke
        };
        if report {
            self.notify_connection_failure();
        }
        CheckOutcome::Failed(error)
    }

    /// Start the update the user was prompted about.
    ///
    /// Valid while a prompt is pending, including while a later check is
    /// still running; a second confirmation is rejected without side
    /// effects.
    pub async fn confirm_update(&self) -> Result<PatchOutcome, Rejection> {
        let target_version = {
            let mut inner = self.lock();
            let next = inner.state.apply(Transition::Confirm)?;
            let target = next.target_version().unwrap_or_default().to_string();
            inner.state = next;
            target
        };
        info!("Update to {target_version} confirmed");
        Ok(self.run_patch(target_version).await)
    }

    /// Download and install `target_version` now.
    ///
    /// Rejected while a check or another patch is in flight.
    pub async fn patch(&self, target_version: impl Into<String>) -> Result<PatchOutcome, Rejection> {
        let target_version = target_version.into();
        {
            let mut inner = self.lock();
            inner.state = inner
                .state
                .apply(Transition::StartPatch(target_version.clone()))?;
        }
        Ok(self.run_patch(target_version).await)
    }

    /// Entered in `Downloading`.
    async fn run_patch(&self, target_version: String) -> PatchOutcome {
        self.notifier
            .notify(Notification::new("Downloading update", "Please wait"));

        let on_progress = |loaded: u64, total: Option<u64>| self.notifier.progress(loaded, total);
        let download = self
            .catalog
            .download_key(PATCH_KEY, &self.install_path, &on_progress)
            .await;
        self.notifier.clear_progress();

        let archive = match download {
            Ok(path) => path,
            Err(source) => {
                let error = UpdateError::CatalogDownload {
                    key: PATCH_KEY.to_string(),
                    source,
                };
                warn!("Update download failed: {error}");
                let was_manual = {
                    let mut inner = self.lock();
                    Self::store(&mut inner, Transition::Abort);
                    std::mem::take(&mut inner.manual_invoke)
                };
                if was_manual {
                    self.notify_connection_failure();
                }
                return PatchOutcome::DownloadFailed(error);
            }
        };

        self.advance(Transition::FinishDownload);
        self.notifier
            .notify(Notification::new("Installing update", "Please wait"));

        let guard = self.shutdown.block();
        info!("Asking {} to exit before installing", self.companion);
        self.signal.send(&self.companion, EXIT_SIGNAL, "");
        tokio::time::sleep(self.grace_delay).await;

        match installer::install(&archive, &self.install_path).await {
            Ok(files) => {
                self.notifier.notify(Notification::new(
                    "Update finished",
                    format!("Current version: {target_version}"),
                ));
                drop(guard);
                {
                    let mut inner = self.lock();
                    Self::store(&mut inner, Transition::FinishInstall);
                    inner.manual_invoke = false;
                }
                info!("Update to {target_version} finished ({files} file(s) written)");
                PatchOutcome::Installed {
                    version: target_version,
                    files,
                }
            }
            Err(error) => {
                error!("Installing update {target_version} failed: {error}");
                drop(guard);
                {
                    let mut inner = self.lock();
                    Self::store(&mut inner, Transition::Abort);
                    inner.manual_invoke = false;
                }
                self.notifier.notify(Notification::new(
                    "Update failed",
                    format!("{} could not be updated to {target_version}", self.product_name),
                ));
                PatchOutcome::InstallFailed(error)
            }
        }
    }

    fn notify_connection_failure(&self) {
        self.notifier.notify(Notification::new(
            "Update failed",
            "please check your internet connection",
        ));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, transition: Transition) -> bool {
        Self::store(&mut self.lock(), transition)
    }

    /// End the running check, unless a confirmed patch already took over.
    fn leave_check(inner: &mut Inner, transition: Transition) -> bool {
        if !inner.state.is_checking() {
            debug!("Update check superseded, state is now {}", inner.state);
            return false;
        }
        Self::store(inner, transition)
    }

    /// Apply `transition` to the locked state, logging a rejection.
    fn store(inner: &mut Inner, transition: Transition) -> bool {
        let from = inner.state.to_string();
        match inner.state.apply(transition) {
            Ok(next) => {
                debug!("Update state: {from} -> {next}");
                inner.state = next;
                true
            }
            Err(rejection) => {
                warn!("Update state {from} unchanged: {rejection}");
                false
            }
        }
    }
}

impl fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("install_path", &self.install_path)
            .field("companion", &self.companion)
            .field("grace_delay", &self.grace_delay)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
