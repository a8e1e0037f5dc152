//! The closed set of job and device states.
//!
//! The same taxonomy is used for a job's aggregate `status` and for the
//! per-device status carried by each stream event.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Starting,
    Running,
    Uploading,
    Completed,
    Failed,
    /// Some targeted devices succeeded and others failed.
    Partial,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Pending,
        Status::Starting,
        Status::Running,
        Status::Uploading,
        Status::Completed,
        Status::Failed,
        Status::Partial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    /// Terminal states are expected to stop further stream events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Partial)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string outside the closed taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status value: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A status as received from the server.
///
/// Decoding never fails on an unexpected string: it is kept verbatim as
/// `Unrecognized` so the view can still render it and the data-contract
/// violation can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusValue {
    Known(Status),
    Unrecognized(String),
}

impl StatusValue {
    pub fn known(&self) -> Option<Status> {
        match self {
            Self::Known(status) => Some(*status),
            Self::Unrecognized(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(status) => status.as_str(),
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.known().is_some_and(|status| status.is_terminal())
    }

    /// Returns the contract violation for an unrecognized value.
    pub fn check(&self) -> Result<Status, UnknownStatus> {
        match self {
            Self::Known(status) => Ok(*status),
            Self::Unrecognized(raw) => Err(UnknownStatus(raw.clone())),
        }
    }
}

impl From<Status> for StatusValue {
    fn from(status: Status) -> Self {
        Self::Known(status)
    }
}

impl From<String> for StatusValue {
    fn from(raw: String) -> Self {
        match raw.parse::<Status>() {
            Ok(status) => Self::Known(status),
            Err(UnknownStatus(raw)) => Self::Unrecognized(raw),
        }
    }
}

impl From<StatusValue> for String {
    fn from(value: StatusValue) -> Self {
        match value {
            StatusValue::Known(status) => status.as_str().to_string(),
            StatusValue::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
