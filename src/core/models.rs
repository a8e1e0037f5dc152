use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::ConnectionState;
use super::status::StatusValue;

/// Authoritative job record, as returned by the snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    pub device_serials: Vec<String>,
    pub status: StatusValue,
    /// Requested trace duration in seconds.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result_summary: Option<String>,
}

/// One per-device status observation pushed while a job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub device_serial: String,
    pub status: StatusValue,
    #[serde(default)]
    pub message: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Set once the device's trace artifact has been stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Link to the stored trace, filled in by the client from `trace_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_url: Option<String>,
}

/// The structure handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedView {
    pub job_id: String,
    pub job: Option<Job>,
    /// Newest first.
    pub timeline: Vec<StreamEvent>,
    pub is_live: bool,
    pub connection: ConnectionState,
}

/// ISO-8601 timestamps with or without an offset. Naive values are UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw:?}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer, de::Error};

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw:?}"))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::Status;
    use chrono::TimeZone;

    #[test]
    fn decodes_job_snapshot_with_naive_timestamps() {
        let json = r#"{
            "job_id": "J1",
            "config_id": "cfg-1",
            "device_serials": ["D1", "D2"],
            "status": "running",
            "created_at": "2025-03-01T10:15:30.123456",
            "updated_at": "2025-03-01T10:16:00",
            "duration": 30,
            "result_summary": null
        }"#;

        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.job_id, "J1");
        assert_eq!(job.device_serials, vec!["D1", "D2"]);
        assert_eq!(job.status, StatusValue::Known(Status::Running));
        assert_eq!(job.duration, Some(30));
        assert_eq!(
            job.updated_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 16, 0).unwrap())
        );
        assert!(job.result_summary.is_none());
    }

    #[test]
    fn decodes_stream_event_with_offset_timestamp() {
        let json = r#"{
            "device_serial": "D1",
            "status": "completed",
            "message": "Trace collected successfully",
            "timestamp": "2025-03-01T10:15:30.5+00:00",
            "trace_id": "TR1"
        }"#;

        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.status, StatusValue::Known(Status::Completed));
        assert_eq!(event.trace_id.as_deref(), Some("TR1"));
        assert_eq!(event.timestamp.timestamp(), 1740824130);
    }

    #[test]
    fn stream_event_message_defaults_to_empty() {
        let json = r#"{"device_serial":"D2","status":"failed","timestamp":"2025-03-01T10:15:31Z"}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.message, "");
        assert!(event.trace_id.is_none());
    }

    #[test]
    fn rejects_garbage_timestamps() {
        let json = r#"{"device_serial":"D2","status":"failed","timestamp":"T2"}"#;
        assert!(serde_json::from_str::<StreamEvent>(json).is_err());
    }
}
