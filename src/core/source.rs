use async_trait::async_trait;
use futures::stream::BoxStream;

use super::models::Job;

/// Raw `data:` payloads of the job's push channel, in arrival order.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid response body: {0}")]
    Body(#[from] serde_json::Error),

    /// The server reported a failure on the push channel itself.
    #[error("stream error reported by server: {0}")]
    Stream(String),

    #[error("timed out waiting for {url}")]
    Timeout { url: String },
}

/// The two server endpoints a job view consumes.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Fetch the authoritative job snapshot.
    async fn fetch_job(&self, job_id: &str) -> Result<Job, TransportError>;

    /// Open the push channel. Returning `Ok` means the handshake succeeded.
    async fn open_stream(&self, job_id: &str) -> Result<FrameStream, TransportError>;

    /// Where the stored artifact for `trace_id` can be viewed, if anywhere.
    fn trace_url(&self, _trace_id: &str) -> Option<String> {
        None
    }
}
