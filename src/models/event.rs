use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized access-log request event (§3 NormalizedEvent). Transient:
/// produced only during parsing and discarded after the downstream stages
/// consume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub bytes_sent: u64,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub user: Option<String>,
    pub protocol: String,
    /// 1-based line number in the source file, for evidence samples.
    pub line_number: u64,
    /// The raw line text, for evidence samples and round-trip tests.
    pub raw: String,
}

impl NormalizedEvent {
    pub fn status_class(&self) -> Option<u16> {
        match self.status {
            200..=299 => Some(2),
            300..=399 => Some(3),
            400..=499 => Some(4),
            500..=599 => Some(5),
            _ => None,
        }
    }
}

/// A single error-log occurrence (§3 ErrorOccurrence), prior to fingerprint
/// grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawErrorEvent {
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub message: String,
    pub stack_trace: Option<String>,
    pub file_path: Option<String>,
    pub file_line: Option<u32>,
    pub function_name: Option<String>,
    pub request_url: Option<String>,
    pub request_method: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub context: std::collections::BTreeMap<String, String>,
    pub line_number: u64,
    pub raw: String,
}
