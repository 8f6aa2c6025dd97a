//! Local version marker and version comparison.
//!
//! Versions are opaque strings: `"1.10"` and `"1.9"` are simply different,
//! and any difference counts as an available update. There is no ordering.

use crate::constants::VERSION_MARKER_FILE;
use crate::core::UpdateError;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Path of the marker file inside `install_path`.
#[must_use]
pub fn marker_path(install_path: &Path) -> PathBuf {
    install_path.join(VERSION_MARKER_FILE)
}

/// Read the installed version: the first line of the marker file.
///
/// An empty file yields an empty version string.
pub async fn read_installed_version(install_path: &Path) -> Result<String, UpdateError> {
    let path = marker_path(install_path);
    let content = fs::read_to_string(&path)
        .await
        .map_err(|source| UpdateError::VersionMarker {
            path: path.clone(),
            source,
        })?;

    Ok(content.lines().next().unwrap_or_default().to_string())
}

/// Normalise a remote version descriptor.
///
/// Only the trailing line terminator is removed; everything else is kept
/// byte-for-byte.
#[must_use]
pub fn normalize_descriptor(raw: &str) -> &str {
    raw.trim_end_matches(['\r', '\n'])
}

/// Whether `target` differs from `current`.
#[must_use]
pub fn is_update_available(current: &str, target: &str) -> bool {
    current != target
}
