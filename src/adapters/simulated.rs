use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::core::{FrameStream, Job, JobSource, Status, StatusValue, StreamEvent, TransportError};

enum StreamCommand {
    Frame(String),
    Break(String),
}

#[derive(Default)]
struct SimState {
    job: Option<Job>,
    fail_polls: bool,
    refuse_streams: bool,
    /// Only the most recently opened channel receives commands.
    stream_tx: Option<mpsc::UnboundedSender<StreamCommand>>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<SimState>,
    fetches: AtomicUsize,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not wedge every later call.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process [`JobSource`] driven by a [`SimulationController`].
#[derive(Clone)]
pub struct SimulatedSource {
    shared: Arc<Shared>,
}

/// Handle used to script what the simulated service returns.
#[derive(Clone)]
pub struct SimulationController {
    shared: Arc<Shared>,
}

impl SimulatedSource {
    pub fn new() -> (Self, SimulationController) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: shared.clone(),
            },
            SimulationController { shared },
        )
    }
}

/// Counts the channel as released when the stream is dropped.
struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobSource for SimulatedSource {
    async fn fetch_job(&self, job_id: &str) -> Result<Job, TransportError> {
        self.shared.fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.shared.lock();

        if state.fail_polls {
            return Err(TransportError::Status {
                url: format!("sim://jobs/{job_id}"),
                status: 503,
            });
        }

        match &state.job {
            Some(job) if job.job_id == job_id => Ok(job.clone()),
            _ => Err(TransportError::Status {
                url: format!("sim://jobs/{job_id}"),
                status: 404,
            }),
        }
    }

    async fn open_stream(&self, job_id: &str) -> Result<FrameStream, TransportError> {
        let mut state = self.shared.lock();
        if state.refuse_streams {
            return Err(TransportError::Status {
                url: format!("sim://jobs/{job_id}/stream"),
                status: 503,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(StreamCommand::Frame(r#"{"type": "connected"}"#.to_string()));
        state.stream_tx = Some(tx);
        self.shared.opened.fetch_add(1, Ordering::SeqCst);

        let guard = ReleaseGuard(self.shared.released.clone());
        let frames = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            match rx.recv().await? {
                StreamCommand::Frame(data) => Some((Ok(data), (rx, guard))),
                StreamCommand::Break(reason) => {
                    Some((Err(TransportError::Stream(reason)), (rx, guard)))
                }
            }
        });

        Ok(frames.boxed())
    }
}

impl SimulationController {
    pub fn set_job(&self, job: Job) {
        self.shared.lock().job = Some(job);
    }

    /// Change the status of the current job, as the server would.
    pub fn set_status(&self, status: Status, result_summary: Option<&str>) {
        if let Some(job) = self.shared.lock().job.as_mut() {
            job.status = StatusValue::Known(status);
            job.updated_at = Some(Utc::now());
            if let Some(summary) = result_summary {
                job.result_summary = Some(summary.to_string());
            }
        }
    }

    pub fn fail_polls(&self, fail: bool) {
        self.shared.lock().fail_polls = fail;
    }

    pub fn refuse_streams(&self, refuse: bool) {
        self.shared.lock().refuse_streams = refuse;
    }

    pub fn push_event(&self, event: &StreamEvent) {
        match serde_json::to_string(event) {
            Ok(data) => self.push_raw(&data),
            Err(e) => tracing::warn!(error = %e, "(Simulator) Failed to encode event"),
        }
    }

    /// Send a payload exactly as given, valid or not.
    pub fn push_raw(&self, data: &str) {
        self.send(StreamCommand::Frame(data.to_string()));
    }

    /// Fail the open channel with a transport error.
    pub fn break_stream(&self, reason: &str) {
        self.send(StreamCommand::Break(reason.to_string()));
    }

    /// Close the open channel from the server side.
    pub fn end_stream(&self) {
        self.shared.lock().stream_tx = None;
    }

    pub fn fetch_count(&self) -> usize {
        self.shared.fetches.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn streams_released(&self) -> usize {
        self.shared.released.load(Ordering::SeqCst)
    }

    fn send(&self, command: StreamCommand) {
        if let Some(tx) = &self.shared.lock().stream_tx {
            let _ = tx.send(command);
        }
    }

    /// Play a complete job: every device starts, runs and uploads; the last
    /// device fails when there is more than one, so the job ends `partial`.
    pub async fn run_script(&self, job_id: &str, device_serials: &[String], step: Duration) {
        let created_at = Utc::now();
        self.set_job(Job {
            job_id: job_id.to_string(),
            config_id: Some("sim-config".to_string()),
            device_serials: device_serials.to_vec(),
            status: Status::Pending.into(),
            duration: Some(10),
            created_at,
            updated_at: None,
            result_summary: None,
        });

        tokio::time::sleep(step).await;
        self.set_status(Status::Running, None);

        let phases = [
            (Status::Starting, "Starting trace collection"),
            (Status::Running, "Collecting trace..."),
            (Status::Uploading, "Uploading trace to storage..."),
        ];
        for (status, message) in phases {
            for serial in device_serials {
                self.push_event(&device_event(serial, status, message, None));
                tokio::time::sleep(step).await;
            }
        }

        let mut failures = 0;
        for (index, serial) in device_serials.iter().enumerate() {
            let event = if device_serials.len() > 1 && index == device_serials.len() - 1 {
                failures += 1;
                device_event(serial, Status::Failed, "Failed to collect trace", None)
            } else {
                let trace_id = format!("trace-{serial}");
                device_event(
                    serial,
                    Status::Completed,
                    "Trace collected successfully",
                    Some(&trace_id),
                )
            };
            self.push_event(&event);
            tokio::time::sleep(step).await;
        }

        let (status, summary) = if failures == 0 {
            (Status::Completed, "All devices traced")
        } else {
            (Status::Partial, "Some devices failed")
        };
        self.set_status(status, Some(summary));
        self.end_stream();
    }
}

fn device_event(serial: &str, status: Status, message: &str, trace_id: Option<&str>) -> StreamEvent {
    StreamEvent {
        device_serial: serial.to_string(),
        status: status.into(),
        message: format!("{message} ({serial})"),
        timestamp: Utc::now(),
        trace_id: trace_id.map(str::to_string),
        trace_url: None,
    }
}
