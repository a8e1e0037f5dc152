//! Periodic fetch of the authoritative job snapshot.
//!
//! Only successful fetches are forwarded, so a failed poll leaves the last
//! known snapshot on screen. Errors never stop the poller; cancellation
//! stops it immediately, including a fetch that is still in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::reconciler::ViewUpdate;
use super::source::JobSource;

pub struct SnapshotPoller {
    job_id: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotPoller {
    /// Start polling; the first fetch happens immediately.
    pub fn start(
        source: Arc<dyn JobSource>,
        job_id: impl Into<String>,
        interval: Duration,
        updates: mpsc::Sender<ViewUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        let job_id = job_id.into();
        let handle = tokio::spawn(poll_loop(
            source,
            job_id.clone(),
            interval,
            updates,
            cancel.clone(),
        ));

        Self {
            job_id,
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop polling and wait for the timer to be released. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(job_id = %self.job_id, error = %e, "Poller task did not exit cleanly");
            }
        }
    }
}

impl Drop for SnapshotPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    source: Arc<dyn JobSource>,
    job_id: String,
    interval: Duration,
    updates: mpsc::Sender<ViewUpdate>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            fetched = source.fetch_job(&job_id) => fetched,
        };

        match fetched {
            Ok(job) => {
                if consecutive_failures > 0 {
                    debug!(job_id = %job_id, consecutive_failures, "Snapshot poll recovered");
                    consecutive_failures = 0;
                }
                if updates.send(ViewUpdate::Snapshot(job)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    job_id = %job_id,
                    consecutive_failures,
                    error = %e,
                    "Snapshot poll failed; keeping last known state"
                );
            }
        }
    }

    debug!(job_id = %job_id, "Snapshot poller stopped");
}
