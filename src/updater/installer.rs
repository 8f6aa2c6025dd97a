//! Applying a downloaded patch archive.
//!
//! The archive is extracted flat over the install directory, overwriting
//! whatever is there. There is no staging and no rollback: if extraction
//! fails halfway the directory is left partially updated, and the caller
//! reports that instead of retrying.

use crate::core::UpdateError;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Extract every entry of `archive` into `destination`, overwriting files.
///
/// Runs on the blocking pool. Returns the number of files written.
pub async fn extract_over(archive: &Path, destination: &Path) -> Result<usize, UpdateError> {
    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();

    let join_archive = archive.clone();
    let join_destination = destination.clone();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, &destination))
        .await
        .map_err(|e| UpdateError::Extraction {
            archive: join_archive,
            destination: join_destination,
            reason: format!("extraction task failed: {e}"),
        })?
}

fn extract_blocking(archive_path: &Path, destination: &Path) -> Result<usize, UpdateError> {
    let fail = |reason: String| UpdateError::Extraction {
        archive: archive_path.to_path_buf(),
        destination: destination.to_path_buf(),
        reason,
    };

    let file = File::open(archive_path).map_err(|e| fail(format!("cannot open archive: {e}")))?;
    let mut archive = ZipArchive::new(file).map_err(|e| fail(format!("not a zip archive: {e}")))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| fail(format!("corrupt entry #{index}: {e}")))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(fail(format!("unsafe entry path '{}'", entry.name())));
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = destination.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| fail(format!("cannot create {}: {e}", target.display())))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| fail(format!("cannot create {}: {e}", parent.display())))?;
        }

        let mut out = File::create(&target)
            .map_err(|e| fail(format!("cannot write {}: {e}", target.display())))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| fail(format!("cannot write {}: {e}", target.display())))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            // Keep files owner-writable so the next patch can overwrite them.
            fs::set_permissions(&target, fs::Permissions::from_mode(mode | 0o200))
                .map_err(|e| fail(format!("cannot set mode on {}: {e}", target.display())))?;
        }

        debug!("Extracted {}", relative.display());
        written += 1;
    }

    info!("Extracted {written} file(s) into {}", destination.display());
    Ok(written)
}

/// Delete the downloaded archive.
pub async fn remove_archive(path: &Path) -> Result<(), UpdateError> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|source| UpdateError::Delete {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Removed archive {}", path.display());
    Ok(())
}

/// Extract `archive` over `destination`, then delete it.
///
/// If extraction fails the archive is still removed (best effort) so a
/// corrupt download is not left in the install directory.
pub async fn install(archive: &Path, destination: &Path) -> Result<usize, UpdateError> {
    match extract_over(archive, destination).await {
        Ok(written) => {
            remove_archive(archive).await?;
            Ok(written)
        }
        Err(e) => {
            if let Err(cleanup) = remove_archive(archive).await {
                debug!("Could not remove archive after failed extraction: {cleanup}");
            }
            Err(e)
        }
    }
}

/// Where the archive for `key` lands inside `dest_dir`.
#[must_use]
pub fn archive_destination(dest_dir: &Path, key: &str) -> PathBuf {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    dest_dir.join(file_name)
}
