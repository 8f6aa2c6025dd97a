//! Progress indicators for terminal output.
//!
//! Thin wrapper over `indicatif` so every bar in the updater shares one
//! look. Bars are hidden when `KIOSK_UPDATER_NO_PROGRESS` is set, which keeps
//! logs clean when the agent runs under a service manager.
//!
//! ```rust,no_run
//! use kiosk_updater::utils::progress::ProgressBar;
//!
//! let bar = ProgressBar::new_download();
//! bar.set_prefix("patch.zip");
//! bar.set_length(4096);
//! bar.set_position(1024);
//! bar.finish_and_clear();
//! ```

use crate::constants::NO_PROGRESS_ENV;
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};

/// Whether progress bars are turned off through the environment.
pub fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// A progress bar with the updater's styling.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Create a byte-counting bar with an unknown length.
    ///
    /// The bar starts as a spinner-like display and switches to a proper bar
    /// once [`set_length`](Self::set_length) is called.
    pub fn new_download() -> Self {
        Self::build(|| {
            let bar = IndicatifBar::no_length();
            bar.set_style(ProgressStyle::download_unknown());
            bar
        })
    }

    /// Create a bar that never draws, regardless of the environment.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    fn build(make: impl FnOnce() -> IndicatifBar) -> Self {
        let inner = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            make()
        };
        Self { inner }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    /// Set the total byte count, switching to the determinate style.
    pub fn set_length(&self, len: u64) {
        if self.inner.length() != Some(len) {
            self.inner.set_length(len);
            self.inner.set_style(ProgressStyle::download());
        }
    }

    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

/// Predefined styles.
pub struct ProgressStyle;

impl ProgressStyle {
    pub fn download() -> IndicatifStyle {
        IndicatifStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("━╸━")
    }

    pub fn download_unknown() -> IndicatifStyle {
        IndicatifStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.cyan} {bytes} ({bytes_per_sec})")
            .unwrap()
    }
}
