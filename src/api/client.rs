//! HTTP client for the job service.
//!
//! Snapshots come from `GET {jobs_path}/{job_id}`; the push channel is the
//! Server-Sent Events response of `GET {jobs_path}/{job_id}/stream`.
//! Stored traces are linked as `{traces_path}/{trace_id}`.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use super::sse::SseDecoder;
use crate::core::{FrameStream, Job, JobSource, TransportError};

pub const DEFAULT_TRACES_PATH: &str = "/traces";

fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// [`JobSource`] backed by the job service's REST API.
#[derive(Clone)]
pub struct HttpJobSource {
    client: reqwest::Client,
    base_url: String,
    jobs_path: String,
    traces_path: String,
    request_timeout: Duration,
}

impl HttpJobSource {
    /// `base_url` is the service root (e.g. `http://localhost:8000`) and
    /// `jobs_path` the collection prefix (e.g. `/jobs`).
    pub fn new(
        base_url: impl Into<String>,
        jobs_path: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        // No client-wide timeout: it would also cut the long-lived stream body.
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            jobs_path: normalize_path(&jobs_path.into()),
            traces_path: DEFAULT_TRACES_PATH.to_string(),
            request_timeout,
        })
    }

    pub fn with_traces_path(mut self, traces_path: &str) -> Self {
        self.traces_path = normalize_path(traces_path);
        self
    }

    pub fn job_url(&self, job_id: &str) -> String {
        format!("{}{}/{}", self.base_url, self.jobs_path, job_id)
    }

    pub fn stream_url(&self, job_id: &str) -> String {
        format!("{}/stream", self.job_url(job_id))
    }

    pub fn trace_url(&self, trace_id: &str) -> String {
        format!("{}{}/{}", self.base_url, self.traces_path, trace_id)
    }
}

fn check_status(response: &reqwest::Response, url: &str) -> Result<(), TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl JobSource for HttpJobSource {
    async fn fetch_job(&self, job_id: &str) -> Result<Job, TransportError> {
        let url = self.job_url(job_id);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        check_status(&response, &url)?;

        let body = response.bytes().await?;
        let job = serde_json::from_slice(&body)?;
        Ok(job)
    }

    async fn open_stream(&self, job_id: &str) -> Result<FrameStream, TransportError> {
        let url = self.stream_url(job_id);
        let connect = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();

        let response = tokio::time::timeout(self.request_timeout, connect)
            .await
            .map_err(|_| TransportError::Timeout { url: url.clone() })??;
        check_status(&response, &url)?;
        debug!(url = %url, "Event stream handshake complete");

        let mut decoder = SseDecoder::new();
        let frames = response
            .bytes_stream()
            .map(move |chunk| {
                let items: Vec<Result<String, TransportError>> = match chunk {
                    Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(TransportError::Request(e))],
                };
                futures::stream::iter(items)
            })
            .flatten();

        Ok(frames.boxed())
    }

    fn trace_url(&self, trace_id: &str) -> Option<String> {
        Some(HttpJobSource::trace_url(self, trace_id))
    }
}
