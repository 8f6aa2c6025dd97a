//! Global constants used throughout the updater.
//!
//! Well-known remote keys, the local marker file name, and the default
//! timings. Defining them centrally keeps the boundary contract with the
//! publishing side in one place.

use std::time::Duration;

/// Remote key holding the published target version string.
pub const VERSION_KEY: &str = "software_update/version.txt";

/// Remote key holding the update archive.
pub const PATCH_KEY: &str = "software_update/patch.zip";

/// Prefix shared by every update key; used to narrow catalog listings.
pub const UPDATE_PREFIX: &str = "software_update/";

/// Name of the version marker file inside the install directory.
///
/// Its first line is the currently installed version.
pub const VERSION_MARKER_FILE: &str = "version.nrocinunerrad";

/// Signal sent to the companion process before the install directory is
/// overwritten.
pub const EXIT_SIGNAL: &str = "exit";

/// Default name of the companion process that must exit before extraction.
pub const DEFAULT_COMPANION_PROCESS: &str = "daemon_plus";

/// Default period between automatic checks (1 hour).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;

/// Default delay between signalling the companion and extracting (1 second).
///
/// Gives the companion time to terminate and release file locks.
pub const DEFAULT_GRACE_DELAY_MS: u64 = 1000;

/// Default timeout applied to every catalog request (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Suffix used for archives while they are still being downloaded.
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = "part";

/// Chunk size used when copying archives from a local catalog.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "KIOSK_UPDATER_CONFIG";

/// Environment variable disabling progress bars.
pub const NO_PROGRESS_ENV: &str = "KIOSK_UPDATER_NO_PROGRESS";

/// Default grace delay as a [`Duration`].
pub fn default_grace_delay() -> Duration {
    Duration::from_millis(DEFAULT_GRACE_DELAY_MS)
}
