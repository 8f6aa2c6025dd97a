//! Fixtures for install directories, catalog mirrors, and patch archives.

use crate::constants::{PATCH_KEY, VERSION_KEY};
use crate::updater::version::marker_path;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Build an in-memory zip archive from `(name, content)` pairs.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(content.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Write a zip archive to `path`.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create archive directory");
    }
    std::fs::write(path, zip_bytes(entries)).expect("write archive");
}

/// A temporary install directory containing a version marker.
pub struct InstallFixture {
    _temp: TempDir,
    path: PathBuf,
}

impl InstallFixture {
    pub fn with_version(version: &str) -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let path = temp.path().join("app");
        std::fs::create_dir_all(&path).expect("create install dir");
        std::fs::write(marker_path(&path), format!("{version}\n")).expect("write marker");
        Self { _temp: temp, path }
    }

    /// An install directory without a version marker.
    pub fn without_marker() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let path = temp.path().join("app");
        std::fs::create_dir_all(&path).expect("create install dir");
        Self { _temp: temp, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.path.join(relative)).ok()
    }

    pub fn installed_version(&self) -> Option<String> {
        self.read(crate::constants::VERSION_MARKER_FILE)
            .map(|content| content.lines().next().unwrap_or_default().to_string())
    }

    /// Names of entries directly inside the install directory.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.path)
            .expect("read install dir")
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// A local catalog directory laid out like the published bucket.
pub struct MirrorFixture {
    temp: TempDir,
}

impl MirrorFixture {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("create temp dir"),
        }
    }

    /// Publish `version` together with a patch archive of `entries`.
    pub fn published(version: &str, entries: &[(&str, &str)]) -> Self {
        let mirror = Self::new();
        mirror.put(VERSION_KEY, version.as_bytes());
        mirror.put(PATCH_KEY, &zip_bytes(entries));
        mirror
    }

    pub fn put(&self, key: &str, bytes: &[u8]) {
        let path = self.temp.path().join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create mirror dir");
        }
        std::fs::write(path, bytes).expect("write mirror key");
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}

impl Default for MirrorFixture {
    fn default() -> Self {
        Self::new()
    }
}
