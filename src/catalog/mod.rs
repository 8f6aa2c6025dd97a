//! Remote catalog of published update files.
//!
//! A catalog is a flat key/value object store (an S3 bucket in production).
//! The updater needs only three operations: list the keys, read a small text
//! key, and download a key to disk while reporting progress.
//!
//! # Implementations
//!
//! - [`HttpCatalog`]: S3-compatible bucket over HTTP(S)
//! - [`LocalCatalog`]: a directory mirror, keys are relative paths
//!
//! # Partial downloads
//!
//! Both implementations write to `<file>.part` and rename into place only
//! after the last byte arrived. A failed transfer removes the part file, so
//! callers never see a truncated archive at the final path.

pub mod http;
pub mod local;

pub use http::HttpCatalog;
pub use local::LocalCatalog;

use crate::config::{CatalogConfig, expand_path};
use crate::constants::PARTIAL_DOWNLOAD_SUFFIX;
use crate::core::CatalogError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One object in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub key: String,
}

impl CatalogEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Download progress callback: `(bytes_loaded, bytes_total)`.
///
/// `bytes_total` is `None` when the size is not known up front.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Read access to the published update files.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// List every key visible to the updater.
    async fn list_keys(&self) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Read a small text object.
    async fn read_text_key(&self, key: &str) -> Result<String, CatalogError>;

    /// Download `key` into `dest_dir`, returning the path of the local file.
    async fn download_key(
        &self,
        key: &str,
        dest_dir: &Path,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf, CatalogError>;
}

/// Build the catalog described by the configuration.
pub fn from_config(
    config: &CatalogConfig,
    timeout: Duration,
) -> anyhow::Result<Arc<dyn RemoteCatalog>> {
    Ok(match config {
        CatalogConfig::Http { url } => Arc::new(HttpCatalog::new(url, timeout)?),
        CatalogConfig::Local { path } => Arc::new(LocalCatalog::new(expand_path(path)?)),
    })
}

/// Temporary path used while `final_path` is being downloaded.
pub(crate) fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PARTIAL_DOWNLOAD_SUFFIX);
    final_path.with_file_name(name)
}

/// Move a completed part file into place.
pub(crate) async fn finish_partial(partial: &Path, final_path: &Path) -> Result<(), CatalogError> {
    tokio::fs::rename(partial, final_path)
        .await
        .map_err(|e| CatalogError::io(final_path, e))
}

/// Remove a part file after a failed transfer, ignoring absence.
pub(crate) async fn discard_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => tracing::debug!("Removed partial download {}", partial.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove partial download {}: {e}", partial.display()),
    }
}
