//! In-memory fakes for the catalog, signal channel, and notifier.

use crate::catalog::{CatalogEntry, ProgressFn, RemoteCatalog};
use crate::constants::{PATCH_KEY, VERSION_KEY};
use crate::core::CatalogError;
use crate::notify::{Notification, Notifier};
use crate::signal::SignalChannel;
use crate::updater::installer::archive_destination;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::fixtures::zip_bytes;

/// Catalog serving objects from memory, with switchable failures and gates.
///
/// A gate parks the matching call until [`FakeCatalog::release_list`] or
/// [`FakeCatalog::release_download`] is called, so tests can observe the
/// coordinator mid-check or mid-download.
#[derive(Default)]
pub struct FakeCatalog {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_list: AtomicBool,
    fail_read: AtomicBool,
    fail_download: AtomicBool,
    list_gate: Mutex<Option<Arc<Notify>>>,
    download_gate: Mutex<Option<Arc<Notify>>>,
    list_calls: AtomicUsize,
    read_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog publishing `version` and a patch archive of `entries`.
    pub fn published(version: &str, entries: &[(&str, &str)]) -> Self {
        let catalog = Self::new();
        catalog.put(VERSION_KEY, version.as_bytes().to_vec());
        catalog.put(PATCH_KEY, zip_bytes(entries));
        catalog
    }

    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_read(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::SeqCst);
    }

    pub fn fail_download(&self, fail: bool) {
        self.fail_download.store(fail, Ordering::SeqCst);
    }

    /// Park subsequent `list_keys` calls until released.
    pub fn hold_list(&self) {
        *self.list_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn release_list(&self) {
        if let Some(gate) = self.list_gate.lock().unwrap().take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    /// Park subsequent `download_key` calls until released.
    pub fn hold_download(&self) {
        *self.download_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn release_download(&self) {
        if let Some(gate) = self.download_gate.lock().unwrap().take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    /// Total number of catalog calls of any kind.
    pub fn calls(&self) -> usize {
        self.list_calls() + self.read_calls() + self.download_calls()
    }

    fn unavailable(key: &str) -> CatalogError {
        CatalogError::Status {
            url: format!("fake://{key}"),
            status: 503,
        }
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, CatalogError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| CatalogError::MissingKey {
                key: key.to_string(),
            })
    }
}

async fn wait_at(gate: &Mutex<Option<Arc<Notify>>>) {
    let gate = gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }
}

#[async_trait]
impl RemoteCatalog for FakeCatalog {
    async fn list_keys(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        wait_at(&self.list_gate).await;
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::unavailable(""));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .map(|key| CatalogEntry::new(key.clone()))
            .collect())
    }

    async fn read_text_key(&self, key: &str) -> Result<String, CatalogError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(Self::unavailable(key));
        }
        Ok(String::from_utf8_lossy(&self.get(key)?).into_owned())
    }

    async fn download_key(
        &self,
        key: &str,
        dest_dir: &Path,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf, CatalogError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        wait_at(&self.download_gate).await;
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(Self::unavailable(key));
        }

        let bytes = self.get(key)?;
        let total = Some(bytes.len() as u64);
        on_progress(0, total);

        let path = archive_destination(dest_dir, key);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| CatalogError::io(&path, e))?;
        on_progress(bytes.len() as u64, total);
        Ok(path)
    }
}

/// Notifier recording everything it is told.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
    progress: Mutex<Vec<(u64, Option<u64>)>>,
    clears: AtomicUsize,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.notifications().into_iter().map(|n| n.title).collect()
    }

    /// Number of notifications whose title contains `needle`.
    pub fn count_titled(&self, needle: &str) -> usize {
        self.titles().iter().filter(|t| t.contains(needle)).count()
    }

    pub fn progress_events(&self) -> Vec<(u64, Option<u64>)> {
        self.progress.lock().unwrap().clone()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.lock().unwrap().is_empty()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }

    fn progress(&self, loaded: u64, total: Option<u64>) {
        self.progress.lock().unwrap().push((loaded, total));
    }

    fn clear_progress(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// One signal captured by [`RecordingSignal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSignal {
    pub target: String,
    pub signal: String,
    pub payload: String,
    /// Content of the watched file at the moment the signal was sent.
    pub snapshot: Option<String>,
}

/// Signal channel recording what was sent.
///
/// With [`RecordingSignal::watching`] it also snapshots a file at send time,
/// which lets tests check that the companion was told to exit before the
/// install directory changed.
#[derive(Debug, Default)]
pub struct RecordingSignal {
    sent: Mutex<Vec<SentSignal>>,
    watch: Option<PathBuf>,
}

impl RecordingSignal {
    pub fn watching(path: impl Into<PathBuf>) -> Self {
        Self {
            sent: Mutex::default(),
            watch: Some(path.into()),
        }
    }

    pub fn sent(&self) -> Vec<SentSignal> {
        self.sent.lock().unwrap().clone()
    }
}

impl SignalChannel for RecordingSignal {
    fn send(&self, target: &str, signal: &str, payload: &str) {
        let snapshot = self
            .watch
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok());
        self.sent.lock().unwrap().push(SentSignal {
            target: target.to_string(),
            signal: signal.to_string(),
            payload: payload.to_string(),
            snapshot,
        });
    }
}
