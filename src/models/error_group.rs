use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Unresolved,
    Resolved,
    Ignored,
}

/// `(site, fingerprint)` unique (§3 ErrorGroup).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub site_id: String,
    pub fingerprint: String,
    pub error_type: String,
    pub error_message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: u64,
    pub status: GroupStatus,
}

impl ErrorGroup {
    pub fn new(
        site_id: String,
        fingerprint: String,
        error_type: String,
        error_message: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            site_id,
            fingerprint,
            error_type,
            error_message,
            first_seen: at,
            last_seen: at,
            occurrence_count: 0,
            status: GroupStatus::Unresolved,
        }
    }

    /// Fold one more occurrence into this group's counters (§4.7 step 3).
    pub fn record_occurrence(&mut self, at: DateTime<Utc>) {
        self.first_seen = self.first_seen.min(at);
        self.last_seen = self.last_seen.max(at);
        self.occurrence_count += 1;
    }
}

/// An individual error event linked to an [`ErrorGroup`] (§3 ErrorOccurrence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorOccurrence {
    pub id: String,
    pub group_fingerprint: String,
    pub log_file_id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub stack_trace: Option<String>,
    pub file_path: Option<String>,
    pub file_line: Option<u32>,
    pub function_name: Option<String>,
    pub request_url: Option<String>,
    pub request_method: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub context: BTreeMap<String, String>,
}
