//! Catalog backed by a local directory.
//!
//! Keys are paths relative to the root with `/` separators, so a mirror of
//! the bucket laid out as `software_update/version.txt` behaves exactly
//! like the remote one. Useful for air-gapped installs and for tests.

use super::{CatalogEntry, ProgressFn, RemoteCatalog, discard_partial, finish_partial, partial_path};
use crate::constants::COPY_CHUNK_SIZE;
use crate::core::CatalogError;
use crate::updater::installer::archive_destination;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct LocalCatalog {
    root: PathBuf,
}

impl LocalCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn open_error(&self, key: &str, path: &Path, e: std::io::Error) -> CatalogError {
        if e.kind() == ErrorKind::NotFound {
            CatalogError::MissingKey {
                key: key.to_string(),
            }
        } else {
            CatalogError::io(path, e)
        }
    }

    async fn copy_to(
        &self,
        source: &Path,
        partial: &Path,
        key: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64, CatalogError> {
        let mut input = tokio::fs::File::open(source)
            .await
            .map_err(|e| self.open_error(key, source, e))?;
        let total = input.metadata().await.ok().map(|m| m.len());
        let mut output = tokio::fs::File::create(partial)
            .await
            .map_err(|e| CatalogError::io(partial, e))?;

        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        let mut loaded = 0u64;
        on_progress(loaded, total);

        loop {
            let read = input
                .read(&mut buffer)
                .await
                .map_err(|e| CatalogError::io(source, e))?;
            if read == 0 {
                break;
            }
            output
                .write_all(&buffer[..read])
                .await
                .map_err(|e| CatalogError::io(partial, e))?;
            loaded += read as u64;
            on_progress(loaded, total);
        }

        output.sync_all().await.map_err(|e| CatalogError::io(partial, e))?;
        Ok(loaded)
    }
}

#[async_trait]
impl RemoteCatalog for LocalCatalog {
    async fn list_keys(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || -> Result<Vec<CatalogEntry>, CatalogError> {
            let mut entries = Vec::new();
            for entry in WalkDir::new(&root).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    CatalogError::io(path, e.into())
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                entries.push(CatalogEntry::new(key));
            }
            Ok(entries)
        })
        .await
        .map_err(|e| CatalogError::InvalidListing {
            reason: format!("listing task failed: {e}"),
        })??;

        debug!("Listed {} key(s) under {}", entries.len(), self.root.display());
        Ok(entries)
    }

    async fn read_text_key(&self, key: &str) -> Result<String, CatalogError> {
        let path = self.key_path(key);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| self.open_error(key, &path, e))
    }

    async fn download_key(
        &self,
        key: &str,
        dest_dir: &Path,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf, CatalogError> {
        let source = self.key_path(key);
        let final_path = archive_destination(dest_dir, key);
        let partial = partial_path(&final_path);

        info!("Copying {} to {}", source.display(), final_path.display());
        match self.copy_to(&source, &partial, key, on_progress).await {
            Ok(bytes) => {
                finish_partial(&partial, &final_path).await?;
                info!("Copied {bytes} bytes");
                Ok(final_path)
            }
            Err(e) => {
                discard_partial(&partial).await;
                Err(e)
            }
        }
    }
}
