//! Test utilities for kiosk-updater
//!
//! Hand-written fakes for the coordinator's collaborators plus fixtures for
//! install directories, catalog mirrors, and patch archives. Available to
//! unit tests and, through the `test-utils` feature, to integration tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use kiosk_updater::test_utils::{FakeCatalog, InstallFixture, RecordingNotifier, RecordingSignal};
//! use kiosk_updater::updater::UpdateCoordinator;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let install = InstallFixture::with_version("1.0");
//! let catalog = Arc::new(FakeCatalog::published("2.0", &[("version.nrocinunerrad", "2.0")]));
//! let notifier = Arc::new(RecordingNotifier::default());
//! let signal = Arc::new(RecordingSignal::default());
//!
//! let coordinator = UpdateCoordinator::new(catalog, signal, notifier, install.path())
//!     .with_grace_delay(std::time::Duration::ZERO);
//! coordinator.check_for_update(true).await;
//! # }
//! ```

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeCatalog, RecordingNotifier, RecordingSignal, SentSignal};
pub use fixtures::{InstallFixture, MirrorFixture, write_zip, zip_bytes};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; does nothing when neither
/// is set.
///
/// ```bash
/// RUST_LOG=kiosk_updater=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
