//! Blocking host shutdown while the install directory is being rewritten.
//!
//! [`ShutdownBlocker::block`] hands out an [`ExitGuard`]; the host is
//! expected to consult [`ShutdownBlocker::is_blocked`] (or await
//! [`ShutdownBlocker::wait_released`]) before exiting. The block is advisory:
//! anything that exits the process while a guard is alive has a bug.
//!
//! Guards release on drop, including when an install step returns early
//! with an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct Shared {
    holders: AtomicUsize,
    released: Notify,
}

/// Process-wide exit block shared between the coordinator and the host.
#[derive(Debug, Clone, Default)]
pub struct ShutdownBlocker {
    shared: Arc<Shared>,
}

impl ShutdownBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block host exit until the returned guard is dropped.
    #[must_use = "the block is released as soon as the guard is dropped"]
    pub fn block(&self) -> ExitGuard {
        let holders = self.shared.holders.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Host exit blocked ({holders} holder(s))");
        ExitGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether any guard is currently alive.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.shared.holders.load(Ordering::SeqCst) > 0
    }

    /// Wait until no guard is alive. Returns immediately when unblocked.
    pub async fn wait_released(&self) {
        loop {
            let notified = self.shared.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and
            // the await is not missed.
            notified.as_mut().enable();
            if !self.is_blocked() {
                return;
            }
            notified.await;
        }
    }
}

/// Token that keeps the host from exiting while alive.
#[derive(Debug)]
pub struct ExitGuard {
    shared: Arc<Shared>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let remaining = self.shared.holders.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("Host exit guard released ({remaining} remaining)");
        if remaining == 0 {
            self.shared.released.notify_waiters();
        }
    }
}
