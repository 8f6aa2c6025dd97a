use crate::constants::{DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_GRACE_DELAY_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for update timing and automatic behaviour.
///
/// This is the `[update]` section of the configuration file.
///
/// # Default Behavior
///
/// - Automatic checks are **disabled**; a manual check always works.
/// - The timer fires every hour once enabled.
/// - No check at startup (the first check happens after one interval).
/// - One second between telling the companion to exit and extracting.
///
/// ## TOML Example
/// ```toml
/// [update]
/// enabled = true
/// check_interval = 3600
/// check_on_startup = false
/// grace_delay_ms = 1000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateConfig {
    /// Whether timer-driven checks are permitted.
    ///
    /// Manual checks ignore this flag.
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between automatic checks. `0` disables the timer entirely.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Run an automatic check as soon as the scheduler starts.
    #[serde(default)]
    pub check_on_startup: bool,

    /// Milliseconds to wait after signalling the companion before extracting.
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval: default_check_interval(),
            check_on_startup: false,
            grace_delay_ms: default_grace_delay_ms(),
        }
    }
}

const fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

const fn default_grace_delay_ms() -> u64 {
    DEFAULT_GRACE_DELAY_MS
}

impl UpdateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timer period, or `None` when the timer is switched off.
    #[must_use]
    pub const fn check_interval(&self) -> Option<Duration> {
        if self.check_interval == 0 {
            None
        } else {
            Some(Duration::from_secs(self.check_interval))
        }
    }

    #[must_use]
    pub const fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }
}
