//! Push channel lifecycle for a single job.
//!
//! The manager opens the channel, forwards every decoded device update to
//! the view's sequencer, and reports connection state changes alongside
//! them. Malformed payloads are dropped without touching the channel.
//!
//! With the default [`ReconnectPolicy`] the error path is one-shot: once
//! the channel errors it stays errored until the owner asks for a
//! reconnect. A policy with `max_attempts > 0` retries with exponential
//! backoff instead.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::ConnectionState;
use super::models::StreamEvent;
use super::reconciler::ViewUpdate;
use super::source::{FrameStream, JobSource, TransportError};
use crate::logging::LogThrottle;

/// Backoff settings applied after the channel errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Automatic retries per outage; zero disables reconnecting.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// The delay after `current`, clamped to `max_delay`.
pub fn next_delay(current: Duration, policy: &ReconnectPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

/// A decoded `data:` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Connected,
    Heartbeat,
    /// The server gave up on the channel.
    ServerError(String),
    Update(StreamEvent),
}

#[derive(Debug, thiserror::Error)]
pub enum MalformedPayload {
    #[error("payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("unknown frame type {0:?}")]
    UnknownType(String),
    #[error("invalid device update: {0}")]
    Update(#[source] serde_json::Error),
}

#[derive(Deserialize)]
struct ControlFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
}

pub fn parse_frame(data: &str) -> Result<StreamFrame, MalformedPayload> {
    let value: serde_json::Value = serde_json::from_str(data).map_err(MalformedPayload::Json)?;

    if value.get("type").is_some() {
        let control: ControlFrame =
            serde_json::from_value(value).map_err(MalformedPayload::Json)?;
        return match control.kind.as_str() {
            "connected" => Ok(StreamFrame::Connected),
            "heartbeat" => Ok(StreamFrame::Heartbeat),
            "error" => Ok(StreamFrame::ServerError(control.message.unwrap_or_default())),
            _ => Err(MalformedPayload::UnknownType(control.kind)),
        };
    }

    serde_json::from_value(value)
        .map(StreamFrame::Update)
        .map_err(MalformedPayload::Update)
}

/// Owns the background task that keeps one job's push channel.
///
/// The channel is released exactly once: when the task exits, which
/// happens on peer close or error (one-shot policy) or on [`close`].
///
/// [`close`]: StreamConnectionManager::close
pub struct StreamConnectionManager {
    job_id: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl StreamConnectionManager {
    /// Start connecting. `cancel` should be owned by the job view.
    pub fn connect(
        source: Arc<dyn JobSource>,
        job_id: impl Into<String>,
        updates: mpsc::Sender<ViewUpdate>,
        policy: ReconnectPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self::spawn(source, job_id.into(), updates, policy, cancel, false)
    }

    /// Start a new channel for a view whose previous channel errored.
    pub fn reconnect(
        source: Arc<dyn JobSource>,
        job_id: impl Into<String>,
        updates: mpsc::Sender<ViewUpdate>,
        policy: ReconnectPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self::spawn(source, job_id.into(), updates, policy, cancel, true)
    }

    fn spawn(
        source: Arc<dyn JobSource>,
        job_id: String,
        updates: mpsc::Sender<ViewUpdate>,
        policy: ReconnectPolicy,
        cancel: CancellationToken,
        resume: bool,
    ) -> Self {
        let task = StreamTask {
            source,
            job_id: job_id.clone(),
            updates,
            policy,
            cancel: cancel.clone(),
            resume,
            malformed_log: LogThrottle::new(Duration::from_secs(5)),
        };
        let handle = tokio::spawn(task.run());

        Self {
            job_id,
            cancel,
            handle: Some(handle),
        }
    }

    /// True once the channel has been given up and no retry is pending.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Tear the channel down and wait for it to be released. Idempotent.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(job_id = %self.job_id, error = %e, "Stream task did not exit cleanly");
            }
        }
    }
}

impl Drop for StreamConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How a connected channel ended.
enum Ended {
    Cancelled,
    /// The sequencer is gone.
    Detached,
    Failed(String),
}

struct StreamTask {
    source: Arc<dyn JobSource>,
    job_id: String,
    updates: mpsc::Sender<ViewUpdate>,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
    /// Announce `connecting` before the first attempt.
    resume: bool,
    malformed_log: LogThrottle,
}

impl StreamTask {
    async fn run(self) {
        let mut attempt = 0u32;
        let mut delay = self.policy.initial_delay;
        let mut announce = self.resume;

        loop {
            if announce && !self.report(ConnectionState::Connecting).await {
                return;
            }
            announce = true;

            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                opened = self.source.open_stream(&self.job_id) => opened,
            };

            let reason = match opened {
                Ok(frames) => {
                    info!(job_id = %self.job_id, attempt, "Stream connected");
                    if !self.report(ConnectionState::Open).await {
                        return;
                    }
                    attempt = 0;
                    delay = self.policy.initial_delay;

                    match self.consume(frames).await {
                        Ended::Cancelled | Ended::Detached => return,
                        Ended::Failed(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };

            warn!(job_id = %self.job_id, error = %reason, "Stream disconnected");
            if !self.report(ConnectionState::Errored).await {
                return;
            }

            if attempt >= self.policy.max_attempts {
                debug!(job_id = %self.job_id, "Not reconnecting");
                return;
            }
            attempt += 1;

            info!(
                job_id = %self.job_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting stream"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = next_delay(delay, &self.policy);
        }
    }

    async fn consume(&self, mut frames: FrameStream) -> Ended {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ended::Cancelled,
                next = frames.next() => next,
            };

            let data = match next {
                Some(Ok(data)) => data,
                Some(Err(e)) => return Ended::Failed(e.to_string()),
                None => return Ended::Failed("closed by server".to_string()),
            };

            match parse_frame(&data) {
                Ok(StreamFrame::Update(mut event)) => {
                    if event.trace_url.is_none() {
                        event.trace_url = event
                            .trace_id
                            .as_deref()
                            .and_then(|trace_id| self.source.trace_url(trace_id));
                    }
                    if self.updates.send(ViewUpdate::Event(event)).await.is_err() {
                        return Ended::Detached;
                    }
                }
                Ok(StreamFrame::Connected) | Ok(StreamFrame::Heartbeat) => {
                    debug!(job_id = %self.job_id, "Stream keep-alive");
                }
                Ok(StreamFrame::ServerError(message)) => {
                    return Ended::Failed(TransportError::Stream(message).to_string());
                }
                Err(e) => {
                    if self.malformed_log.should_log() {
                        warn!(job_id = %self.job_id, error = %e, "Dropping malformed stream payload");
                    }
                }
            }
        }
    }

    /// Forward a state change. Returns false once the sequencer is gone.
    async fn report(&self, state: ConnectionState) -> bool {
        self.updates
            .send(ViewUpdate::Connection(state))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::Status;

    #[test]
    fn next_delay_doubles() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            next_delay(Duration::from_secs(1), &policy),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn backoff_sequence_clamps_at_max() {
        let policy = ReconnectPolicy::default();
        let mut delay = policy.initial_delay;
        let expected = [1, 2, 4, 8, 16, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &policy);
        }
    }

    #[test]
    fn default_policy_does_not_reconnect() {
        assert_eq!(ReconnectPolicy::default().max_attempts, 0);
    }

    #[test]
    fn parses_control_frames() {
        assert_eq!(
            parse_frame(r#"{"type": "connected"}"#).unwrap(),
            StreamFrame::Connected
        );
        assert_eq!(
            parse_frame(r#"{"type":"heartbeat"}"#).unwrap(),
            StreamFrame::Heartbeat
        );
        assert_eq!(
            parse_frame(r#"{"type":"error","message":"redis down"}"#).unwrap(),
            StreamFrame::ServerError("redis down".to_string())
        );
    }

    #[test]
    fn parses_device_update() {
        let frame = parse_frame(
            r#"{"device_serial":"D1","status":"uploading","message":"Uploading trace to storage...","timestamp":"2025-03-01T10:00:01+00:00"}"#,
        )
        .unwrap();

        match frame {
            StreamFrame::Update(event) => {
                assert_eq!(event.device_serial, "D1");
                assert_eq!(event.status.known(), Some(Status::Uploading));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            parse_frame("not json"),
            Err(MalformedPayload::Json(_))
        ));
        assert!(matches!(
            parse_frame(r#"{"type":"progress"}"#),
            Err(MalformedPayload::UnknownType(kind)) if kind == "progress"
        ));
        assert!(matches!(
            parse_frame(r#"{"device_serial":"D1"}"#),
            Err(MalformedPayload::Update(_))
        ));
    }
}
