//! Configuration management for the updater
//!
//! A single TOML file drives the updater: product name, install directory,
//! catalog location, companion process, and update timing. See
//! [`global`] for the file format and location rules, and
//! [`crate::updater::config`] for the `[update]` section.

pub mod global;

pub use global::{CatalogConfig, CompanionConfig, UpdaterConfig, expand_path};
pub use crate::updater::config::UpdateConfig;
