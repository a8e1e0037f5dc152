//! Client side of the job service.
//!
//! ## Architecture
//!
//! - `client`: reqwest-based [`JobSource`](crate::core::JobSource) for the
//!   snapshot and stream endpoints
//! - `sse`: Server-Sent Events framing for the stream endpoint

pub mod client;
pub mod sse;

pub use client::HttpJobSource;
pub use sse::SseDecoder;
