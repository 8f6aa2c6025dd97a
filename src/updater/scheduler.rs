//! Timer driving automatic checks.

use super::coordinator::{CheckOutcome, UpdateCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handle to the timer task started by [`spawn`].
#[derive(Debug)]
pub struct ScheduledChecks {
    handle: JoinHandle<()>,
    stop: Arc<Notify>,
}

impl ScheduledChecks {
    /// Stop ticking, then wait for a check already running to finish,
    /// including any install it started.
    pub async fn stop(self) {
        self.stop.notify_one();
        if let Err(e) = self.handle.await {
            warn!("Update scheduler ended abnormally: {e}");
        }
    }
}

/// Spawn a task calling `check_for_update(false)` every `period`.
///
/// With `check_on_startup` the first check runs immediately, otherwise after
/// one full period. Ticks missed while a check was running are skipped, not
/// replayed. A check is never interrupted once started; [`ScheduledChecks::stop`]
/// takes effect between checks.
pub fn spawn(
    coordinator: Arc<UpdateCoordinator>,
    period: Duration,
    check_on_startup: bool,
) -> ScheduledChecks {
    info!("Checking for updates every {}s", period.as_secs());
    let stop = Arc::new(Notify::new());
    let stopped = Arc::clone(&stop);

    let handle = tokio::spawn(async move {
        let start = if check_on_startup {
            time::Instant::now()
        } else {
            time::Instant::now() + period
        };
        let mut ticker = time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = stopped.notified() => break,
                _ = ticker.tick() => {}
            }
            match coordinator.check_for_update(false).await {
                CheckOutcome::Skipped(reason) => debug!("Scheduled check skipped: {reason}"),
                outcome => debug!("Scheduled check finished: {outcome:?}"),
            }
        }
        debug!("Update scheduler stopped");
    });

    ScheduledChecks { handle, stop }
}
