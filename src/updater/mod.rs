//! Self-update agent.
//!
//! The [`UpdateCoordinator`] checks a remote catalog for a newer published
//! version and, when one is found, downloads the patch archive, tells the
//! companion process to exit, and extracts the archive over the install
//! directory.
//!
//! # Update Process Flow
//!
//! ```text
//! 1. Check (timer or manual)
//!    ├── List catalog keys, look for software_update/version.txt
//!    ├── Read the published version
//!    └── Compare with the first line of <install>/version.nrocinunerrad
//!
//! 2. Decide
//!    ├── Same version: done (manual checks say so)
//!    ├── Manual check: patch straight away
//!    └── Automatic check: ask the user, wait for confirm_update()
//!
//! 3. Patch
//!    ├── Download software_update/patch.zip into the install directory
//!    ├── Block host exit and send `exit` to the companion
//!    ├── Wait the grace delay
//!    ├── Extract over the install directory and delete the archive
//!    └── Release the exit block
//! ```
//!
//! # Triggering
//!
//! Automatic checks come from [`scheduler::spawn`] and are ignored unless
//! the coordinator is enabled. Manual checks always run and are chatty: they
//! announce themselves and report every outcome, including network errors
//! that automatic checks keep quiet about.
//!
//! # Concurrency
//!
//! At most one check and at most one patch run at a time; see
//! [`state`] for the transition table. Overlapping requests are dropped.

pub mod config;
pub mod coordinator;
pub mod installer;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod version;

#[cfg(test)]
mod tests;

pub use config::UpdateConfig;
pub use coordinator::{CheckOutcome, PatchOutcome, SkipReason, StatusSnapshot, UpdateCoordinator};
pub use scheduler::ScheduledChecks;
pub use shutdown::{ExitGuard, ShutdownBlocker};
pub use state::{Rejection, Transition, UpdateState};
