use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One ingestion unit (§3 LogFile). `(site_id, sha256)` is unique: a
/// re-upload of identical bytes reuses the existing file and its derived
/// data rather than creating a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFile {
    pub id: String,
    pub site_id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub storage_key: String,
    pub status: LogFileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogFile {
    pub fn new<S: Into<String>>(
        id: S,
        site_id: S,
        filename: S,
        size_bytes: u64,
        sha256: S,
        storage_key: S,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            site_id: site_id.into(),
            filename: filename.into(),
            size_bytes,
            sha256: sha256.into(),
            storage_key: storage_key.into(),
            status: LogFileStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Parse quality report (§6 "Parse quality report"), persisted per log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseQuality {
    pub total_lines: u64,
    pub parsed_lines: u64,
    pub failed_lines: u64,
    pub empty_lines: u64,
}

impl ParseQuality {
    pub fn success_rate(&self) -> f64 {
        let considered = self.total_lines.saturating_sub(self.empty_lines);
        if considered == 0 {
            return 1.0;
        }
        self.parsed_lines as f64 / considered as f64
    }
}
