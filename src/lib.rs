//! kiosk-updater - self-update agent for long-running kiosk applications
//!
//! Periodically checks an S3-style object store for a newer published
//! version of an installed application and, when one is found, downloads
//! the patch archive, tells the companion process to exit, and extracts the
//! archive over the install directory.
//!
//! # Architecture Overview
//!
//! One stateful component, the [`updater::UpdateCoordinator`], runs the
//! cycle. It reaches everything else through narrow seams:
//!
//! - [`catalog::RemoteCatalog`] - list, read, and download published keys
//! - [`signal::SignalChannel`] - tell the companion process to exit
//! - [`notify::Notifier`] - messages, update prompts, download progress
//!
//! Concrete implementations of each seam ship with the crate
//! ([`catalog::HttpCatalog`], [`catalog::LocalCatalog`],
//! [`signal::FileSignalChannel`], [`notify::ConsoleNotifier`],
//! [`notify::LogNotifier`]), and [`cli`] wires them into the
//! `kiosk-updater` binary.
//!
//! # Published Layout
//!
//! ```text
//! <bucket>/software_update/version.txt   published version string
//! <bucket>/software_update/patch.zip     archive extracted over the install dir
//! <install>/version.nrocinunerrad         first line is the installed version
//! ```
//!
//! Versions are compared as opaque strings: any difference is an update.
//!
//! # Core Modules
//!
//! - [`updater`] - Coordinator, state machine, installer, scheduler
//! - [`catalog`] - Remote catalog trait and implementations
//! - [`config`] - TOML configuration file
//! - [`core`] - Error types and user-facing error formatting
//! - [`constants`] - Well-known keys, file names, and default timings

pub mod catalog;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod notify;
pub mod signal;
pub mod updater;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
