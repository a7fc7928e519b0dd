//! Captured exchange records and the recorder interface.
//!
//! An [`ExchangeRecord`] is one logged observation: a plain HTTP request the
//! proxy answered, or one CONNECT tunnel session. The shape is fixed so that
//! every serialization format sees the same columns; fields that could not be
//! observed carry the [`UNAVAILABLE`] sentinel (or zero / null) instead of
//! being dropped.

pub mod book;
pub mod format;

pub use book::LogBook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::error::RecorderError;

/// Sentinel for best-effort string fields that could not be observed.
pub const UNAVAILABLE: &str = "unavailable";

/// How an exchange ended. Doubles as the failure annotation on records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Plain HTTP request logged and answered.
    Logged,
    /// Request refused by the method filter.
    Rejected,
    /// CONNECT tunnel spliced to completion.
    Tunneled,
    /// The origin could not be dialed within the timeout.
    DialFailed,
    /// The client or origin socket failed mid-exchange.
    StreamError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRecord {
    pub id: Uuid,
    pub method: String,
    /// Request URL, or `host:port` for tunnels.
    pub target: String,
    /// Header keys are kept exactly as received.
    pub headers: HashMap<String, String>,
    /// Request body as lossy UTF-8; always empty for tunnels.
    pub body: String,
    /// Client `ip:port`.
    pub source: String,
    /// Destination `ip:port` with the resolved IP, or "unavailable".
    pub destination: String,
    pub outcome: Outcome,
    /// Milliseconds from classification to completion; null when the
    /// exchange never completed. The field itself is always serialized.
    pub elapsed_ms: Option<u64>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub timestamp: DateTime<Utc>,
}

impl ExchangeRecord {
    /// Start a record with the two fields that are always present.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            target: target.into(),
            headers: HashMap::new(),
            body: String::new(),
            source: UNAVAILABLE.to_string(),
            destination: UNAVAILABLE.to_string(),
            outcome: Outcome::Logged,
            elapsed_ms: None,
            bytes_sent: 0,
            bytes_received: 0,
            timestamp: Utc::now(),
        }
    }
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Logged => "logged",
            Outcome::Rejected => "rejected",
            Outcome::Tunneled => "tunneled",
            Outcome::DialFailed => "dial-failed",
            Outcome::StreamError => "stream-error",
        }
    }
}

/// Receives completed exchange records and owns their persistence.
///
/// `record` buffers in memory and must not block the calling exchange;
/// serialization happens only in `flush`.
#[async_trait]
pub trait RequestRecorder: Send + Sync {
    fn record(&self, record: ExchangeRecord);

    async fn flush(&self, path: &Path) -> Result<(), RecorderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_uses_sentinels() {
        let record = ExchangeRecord::new("GET", "http://example.com/");
        assert_eq!(record.method, "GET");
        assert_eq!(record.source, UNAVAILABLE);
        assert_eq!(record.destination, UNAVAILABLE);
        assert_eq!(record.elapsed_ms, None);
        assert_eq!(record.bytes_sent, 0);
    }

    #[test]
    fn elapsed_field_serializes_even_when_null() {
        let record = ExchangeRecord::new("GET", "/");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("elapsed_ms").is_some());
        assert!(json["elapsed_ms"].is_null());
    }

    #[test]
    fn outcome_serializes_kebab_case() {
        let json = serde_json::to_string(&Outcome::DialFailed).unwrap();
        assert_eq!(json, "\"dial-failed\"");
        assert_eq!(Outcome::DialFailed.as_str(), "dial-failed");
    }
}
