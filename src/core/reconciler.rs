//! Merges the polled snapshot, the event timeline and the connection
//! state into the single [`MergedView`] handed to renderers.
//!
//! Each source is an independent cell. Any change to a cell recomputes
//! the view; the two data sources are never forced into agreement. In
//! particular the job-level status always comes from the snapshot and is
//! never inferred from stream events, which may be incomplete.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::connection::{ConnectionMachine, ConnectionState, Transition};
use super::models::{Job, MergedView, StreamEvent};
use super::status::StatusValue;
use super::timeline::Timeline;

/// A change reported by one of the view's sources.
#[derive(Debug, Clone)]
pub enum ViewUpdate {
    Snapshot(Job),
    Event(StreamEvent),
    Connection(ConnectionState),
}

/// Why a view is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Unmount,
    /// The operator switched to another job; stale events must not remain.
    JobChanged,
}

pub struct Reconciler {
    job_id: String,
    snapshot: Option<Job>,
    timeline: Timeline,
    connection: ConnectionMachine,
}

impl Reconciler {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            snapshot: None,
            timeline: Timeline::new(),
            connection: ConnectionMachine::new(),
        }
    }

    /// Apply one update. Returns true if the merged view changed.
    ///
    /// Nothing is applied once the view has been torn down.
    pub fn apply(&mut self, update: ViewUpdate) -> bool {
        if self.connection.is_closed() {
            debug!(job_id = %self.job_id, "Ignoring update after teardown");
            return false;
        }

        match update {
            ViewUpdate::Snapshot(job) => {
                report_unrecognized(&self.job_id, "snapshot", &job.status);
                if self.snapshot.as_ref() == Some(&job) {
                    return false;
                }
                self.snapshot = Some(job);
                true
            }
            ViewUpdate::Event(event) => {
                report_unrecognized(&self.job_id, &event.device_serial, &event.status);
                self.timeline.append(event);
                true
            }
            ViewUpdate::Connection(next) => match self.connection.transition(next) {
                Transition::Applied => {
                    debug!(job_id = %self.job_id, state = %next, "Connection state changed");
                    true
                }
                Transition::Unchanged => false,
                Transition::Rejected => {
                    debug!(
                        job_id = %self.job_id,
                        from = %self.connection.state(),
                        to = %next,
                        "Ignoring invalid connection transition"
                    );
                    false
                }
            },
        }
    }

    /// Close the connection cell. Switching jobs also empties the timeline.
    pub fn teardown(&mut self, reason: Teardown) -> bool {
        let closed = self.connection.close();
        if reason == Teardown::JobChanged && !self.timeline.is_empty() {
            self.timeline.clear();
            return true;
        }
        closed
    }

    pub fn view(&self) -> MergedView {
        let connection = self.connection.state();
        MergedView {
            job_id: self.job_id.clone(),
            job: self.snapshot.clone(),
            timeline: self.timeline.all(),
            is_live: connection.is_live(),
            connection,
        }
    }

    /// Drive the reconciler as the view's single sequencer.
    ///
    /// Updates are applied strictly in the order they were queued. The
    /// teardown signal takes priority over queued updates, so anything
    /// still queued when the view goes away is discarded.
    pub async fn run(
        mut self,
        mut updates: mpsc::Receiver<ViewUpdate>,
        mut teardown: oneshot::Receiver<Teardown>,
        publish: watch::Sender<MergedView>,
    ) {
        publish.send_replace(self.view());

        let reason = loop {
            tokio::select! {
                biased;
                reason = &mut teardown => break reason.unwrap_or(Teardown::Unmount),
                update = updates.recv() => match update {
                    Some(update) => {
                        if self.apply(update) {
                            publish.send_replace(self.view());
                        }
                    }
                    // Every producer is gone; only the teardown can follow.
                    None => break (&mut teardown).await.unwrap_or(Teardown::Unmount),
                },
            }
        };

        self.teardown(reason);
        publish.send_replace(self.view());
        info!(job_id = %self.job_id, reason = ?reason, "Job view torn down");
    }
}

fn report_unrecognized(job_id: &str, source: &str, status: &StatusValue) {
    if let Err(e) = status.check() {
        warn!(job_id = %job_id, source = %source, error = %e, "Status outside the known taxonomy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::Status;
    use chrono::{TimeZone, Utc};

    fn job(status: Status) -> Job {
        Job {
            job_id: "J1".to_string(),
            config_id: None,
            device_serials: vec!["D1".to_string(), "D2".to_string()],
            status: status.into(),
            duration: Some(30),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            updated_at: None,
            result_summary: None,
        }
    }

    fn event(device: &str, status: Status, second: u32, trace_id: Option<&str>) -> StreamEvent {
        StreamEvent {
            device_serial: device.to_string(),
            status: status.into(),
            message: String::new(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, second).unwrap(),
            trace_id: trace_id.map(str::to_string),
            trace_url: None,
        }
    }

    #[test]
    fn initial_view_is_empty_and_connecting() {
        let view = Reconciler::new("J1").view();
        assert_eq!(view.job_id, "J1");
        assert!(view.job.is_none());
        assert!(view.timeline.is_empty());
        assert!(!view.is_live);
        assert_eq!(view.connection, ConnectionState::Connecting);
    }

    #[test]
    fn stream_events_never_override_snapshot_status() {
        let mut reconciler = Reconciler::new("J1");
        reconciler.apply(ViewUpdate::Connection(ConnectionState::Open));
        reconciler.apply(ViewUpdate::Snapshot(job(Status::Running)));
        reconciler.apply(ViewUpdate::Event(event("D1", Status::Completed, 1, Some("TR1"))));
        reconciler.apply(ViewUpdate::Event(event("D2", Status::Failed, 2, None)));

        let view = reconciler.view();
        let timeline: Vec<_> = view
            .timeline
            .iter()
            .map(|e| (e.device_serial.as_str(), e.status.known()))
            .collect();
        assert_eq!(
            timeline,
            vec![("D2", Some(Status::Failed)), ("D1", Some(Status::Completed))]
        );
        assert_eq!(view.timeline[1].trace_id.as_deref(), Some("TR1"));
        assert_eq!(
            view.job.as_ref().unwrap().status,
            StatusValue::Known(Status::Running)
        );
        assert!(view.is_live);

        reconciler.apply(ViewUpdate::Snapshot(job(Status::Partial)));
        let view = reconciler.view();
        assert_eq!(
            view.job.as_ref().unwrap().status,
            StatusValue::Known(Status::Partial)
        );
        assert_eq!(view.timeline.len(), 2);
    }

    #[test]
    fn identical_snapshot_does_not_count_as_change() {
        let mut reconciler = Reconciler::new("J1");
        assert!(reconciler.apply(ViewUpdate::Snapshot(job(Status::Running))));
        assert!(!reconciler.apply(ViewUpdate::Snapshot(job(Status::Running))));
    }

    #[test]
    fn connection_error_keeps_received_events() {
        let mut reconciler = Reconciler::new("J1");
        reconciler.apply(ViewUpdate::Connection(ConnectionState::Open));
        reconciler.apply(ViewUpdate::Event(event("D1", Status::Running, 1, None)));
        assert!(reconciler.apply(ViewUpdate::Connection(ConnectionState::Errored)));

        let view = reconciler.view();
        assert!(!view.is_live);
        assert_eq!(view.connection, ConnectionState::Errored);
        assert_eq!(view.timeline.len(), 1);
    }

    #[test]
    fn unrecognized_statuses_are_kept() {
        let mut reconciler = Reconciler::new("J1");
        let mut snapshot = job(Status::Running);
        snapshot.status = StatusValue::Unrecognized("paused".to_string());
        assert!(reconciler.apply(ViewUpdate::Snapshot(snapshot)));
        assert_eq!(reconciler.view().job.unwrap().status.as_str(), "paused");
    }

    #[test]
    fn nothing_applies_after_teardown() {
        let mut reconciler = Reconciler::new("J1");
        reconciler.apply(ViewUpdate::Snapshot(job(Status::Running)));
        reconciler.apply(ViewUpdate::Event(event("D1", Status::Running, 1, None)));
        assert!(reconciler.teardown(Teardown::Unmount));

        assert!(!reconciler.apply(ViewUpdate::Snapshot(job(Status::Completed))));
        assert!(!reconciler.apply(ViewUpdate::Event(event("D2", Status::Failed, 2, None))));
        assert!(!reconciler.apply(ViewUpdate::Connection(ConnectionState::Open)));

        let view = reconciler.view();
        assert_eq!(view.connection, ConnectionState::Closed);
        assert_eq!(
            view.job.unwrap().status,
            StatusValue::Known(Status::Running)
        );
        assert_eq!(view.timeline.len(), 1);
        assert!(!reconciler.teardown(Teardown::Unmount));
    }

    #[test]
    fn switching_jobs_clears_the_timeline() {
        let mut reconciler = Reconciler::new("J1");
        reconciler.apply(ViewUpdate::Event(event("D1", Status::Running, 1, None)));
        reconciler.teardown(Teardown::JobChanged);
        assert!(reconciler.view().timeline.is_empty());
    }

    #[tokio::test]
    async fn run_publishes_every_change_and_the_final_closed_view() {
        let (tx, rx) = mpsc::channel(8);
        let (teardown_tx, teardown_rx) = oneshot::channel();
        let (publish, mut views) = watch::channel(Reconciler::new("J1").view());

        let task = tokio::spawn(Reconciler::new("J1").run(rx, teardown_rx, publish));

        tx.send(ViewUpdate::Connection(ConnectionState::Open)).await.unwrap();
        views
            .wait_for(|view| view.is_live)
            .await
            .expect("reconciler stopped early");

        tx.send(ViewUpdate::Event(event("D1", Status::Running, 1, None)))
            .await
            .unwrap();
        views
            .wait_for(|view| view.timeline.len() == 1)
            .await
            .expect("reconciler stopped early");

        teardown_tx.send(Teardown::Unmount).unwrap();
        task.await.unwrap();

        let last = views.borrow().clone();
        assert_eq!(last.connection, ConnectionState::Closed);
        assert!(!last.is_live);
        assert_eq!(last.timeline.len(), 1);
    }

    #[tokio::test]
    async fn run_discards_updates_queued_before_teardown() {
        let (tx, rx) = mpsc::channel(8);
        let (teardown_tx, teardown_rx) = oneshot::channel();
        let (publish, views) = watch::channel(Reconciler::new("J1").view());

        tx.send(ViewUpdate::Snapshot(job(Status::Running))).await.unwrap();
        teardown_tx.send(Teardown::Unmount).unwrap();

        Reconciler::new("J1").run(rx, teardown_rx, publish).await;

        let last = views.borrow().clone();
        assert!(last.job.is_none());
        assert_eq!(last.connection, ConnectionState::Closed);
    }
}
