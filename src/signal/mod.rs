//! Fire-and-forget signalling to companion processes.
//!
//! The updater only ever sends one message (`exit` to the companion daemon
//! before its files are overwritten), but the channel is kept generic over
//! target and signal names.
//!
//! [`FileSignalChannel`] implements a file-drop protocol: sending `signal`
//! to `target` writes `<ipc_dir>/<target>/<signal>` with the payload as its
//! content. The companion polls its directory and deletes the file once
//! handled.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Delivers a named signal to another process.
///
/// Sending never fails from the caller's point of view: delivery problems
/// are logged by the implementation.
pub trait SignalChannel: Send + Sync {
    fn send(&self, target: &str, signal: &str, payload: &str);
}

/// File-drop signal channel rooted at an IPC directory.
#[derive(Debug, Clone)]
pub struct FileSignalChannel {
    ipc_dir: PathBuf,
}

impl FileSignalChannel {
    pub fn new(ipc_dir: impl Into<PathBuf>) -> Self {
        Self {
            ipc_dir: ipc_dir.into(),
        }
    }

    pub fn ipc_dir(&self) -> &Path {
        &self.ipc_dir
    }

    /// Path the signal file for `target`/`signal` is written to.
    pub fn signal_path(&self, target: &str, signal: &str) -> PathBuf {
        self.ipc_dir.join(target).join(signal)
    }

    fn write_signal(&self, target: &str, signal: &str, payload: &str) -> std::io::Result<PathBuf> {
        let path = self.signal_path(target, signal);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, payload)?;
        Ok(path)
    }
}

impl SignalChannel for FileSignalChannel {
    fn send(&self, target: &str, signal: &str, payload: &str) {
        match self.write_signal(target, signal, payload) {
            Ok(path) => debug!("Sent '{signal}' to {target} via {}", path.display()),
            Err(e) => warn!("Failed to send '{signal}' to {target}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writes_signal_file() {
        let temp = TempDir::new().unwrap();
        let channel = FileSignalChannel::new(temp.path().join("ipc"));

        channel.send("daemon_plus", "exit", "");

        let path = temp.path().join("ipc/daemon_plus/exit");
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(path).unwrap(), "");
    }

    #[test]
    fn test_payload_is_file_content() {
        let temp = TempDir::new().unwrap();
        let channel = FileSignalChannel::new(temp.path());

        channel.send("menu_plus", "show", "settings");
        assert_eq!(
            std::fs::read_to_string(channel.signal_path("menu_plus", "show")).unwrap(),
            "settings"
        );
    }

    #[test]
    fn test_failure_is_swallowed() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        // The IPC "directory" is a regular file; send must not panic.
        FileSignalChannel::new(&blocker).send("daemon_plus", "exit", "");
        assert!(blocker.is_file());
    }
}
