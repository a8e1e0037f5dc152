//! A mounted view of one job.
//!
//! Mounting acquires everything the view needs: a reconciler task acting
//! as the single sequencer, the snapshot poller, and the push channel.
//! Nothing is shared with other views. Teardown releases all of it, on
//! every exit path, before returning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::models::MergedView;
use super::poller::SnapshotPoller;
use super::reconciler::{Reconciler, Teardown, ViewUpdate};
use super::source::JobSource;
use super::stream::{ReconnectPolicy, StreamConnectionManager};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Per-view timing knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

pub struct JobView {
    job_id: String,
    source: Arc<dyn JobSource>,
    settings: WatchSettings,
    views: watch::Receiver<MergedView>,
    updates: mpsc::Sender<ViewUpdate>,
    cancel: CancellationToken,
    teardown_tx: Option<oneshot::Sender<Teardown>>,
    reconciler: Option<JoinHandle<()>>,
    poller: SnapshotPoller,
    stream: StreamConnectionManager,
}

impl JobView {
    /// Must be called from within a tokio runtime.
    pub fn mount(
        source: Arc<dyn JobSource>,
        job_id: impl Into<String>,
        settings: WatchSettings,
    ) -> Self {
        let job_id = job_id.into();
        info!(job_id = %job_id, "Mounting job view");

        let reconciler = Reconciler::new(job_id.clone());
        let (publish, views) = watch::channel(reconciler.view());
        let (updates, updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let (teardown_tx, teardown_rx) = oneshot::channel();
        let reconciler = tokio::spawn(reconciler.run(updates_rx, teardown_rx, publish));

        let cancel = CancellationToken::new();
        let poller = SnapshotPoller::start(
            source.clone(),
            job_id.clone(),
            settings.poll_interval,
            updates.clone(),
            cancel.child_token(),
        );
        let stream = StreamConnectionManager::connect(
            source.clone(),
            job_id.clone(),
            updates.clone(),
            settings.reconnect.clone(),
            cancel.child_token(),
        );

        Self {
            job_id,
            source,
            settings,
            views,
            updates,
            cancel,
            teardown_tx: Some(teardown_tx),
            reconciler: Some(reconciler),
            poller,
            stream,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Receiver that observes every recomputed view.
    pub fn subscribe(&self) -> watch::Receiver<MergedView> {
        self.views.clone()
    }

    pub fn current(&self) -> MergedView {
        self.views.borrow().clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.teardown_tx.is_none()
    }

    /// Open a new push channel if the previous one has been given up.
    ///
    /// Returns false when the channel is still active or the view has
    /// already been torn down.
    pub fn reconnect(&mut self) -> bool {
        if self.is_torn_down() || !self.stream.is_finished() {
            return false;
        }

        info!(job_id = %self.job_id, "Reconnect requested");
        self.stream = StreamConnectionManager::reconnect(
            self.source.clone(),
            self.job_id.clone(),
            self.updates.clone(),
            self.settings.reconnect.clone(),
            self.cancel.child_token(),
        );
        true
    }

    /// Tear the view down because it is no longer displayed.
    pub async fn unmount(&mut self) {
        self.teardown(Teardown::Unmount).await;
    }

    /// Tear the view down because another job is about to be shown.
    pub async fn switch_away(&mut self) {
        self.teardown(Teardown::JobChanged).await;
    }

    async fn teardown(&mut self, reason: Teardown) {
        let Some(teardown_tx) = self.teardown_tx.take() else {
            return;
        };

        // Stop applying updates first so nothing lands after this point,
        // even from a poll that resolves while the tasks are shutting down.
        let _ = teardown_tx.send(reason);
        if let Some(handle) = self.reconciler.take() {
            if let Err(e) = handle.await {
                warn!(job_id = %self.job_id, error = %e, "Reconciler task did not exit cleanly");
            }
        }

        self.cancel.cancel();
        self.poller.stop().await;
        self.stream.close().await;
        info!(job_id = %self.job_id, reason = ?reason, "Job view released");
    }
}

impl Drop for JobView {
    fn drop(&mut self) {
        if let Some(teardown_tx) = self.teardown_tx.take() {
            let _ = teardown_tx.send(Teardown::Unmount);
        }
        self.cancel.cancel();
    }
}
