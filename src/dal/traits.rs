//! Repository traits for the pipeline's persistence layer (§6), mirroring
//! the teacher's `EventRepository`/`AlertRepository` split: one trait per
//! concern, implemented concretely by [`crate::dal::sqlx_store`] and, for
//! tests, by [`crate::dal::memory`].

use crate::error::Result;
use crate::models::{ErrorGroup, ErrorOccurrence, Finding, HourlyAggregate, LogFile, ParseQuality, Site};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Content-addressed storage for uploaded log blobs (out of scope per §1;
/// modeled here only as the interface the pipeline driver calls).
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, storage_key: &str) -> Result<Vec<u8>>;
    async fn put(&self, storage_key: &str, bytes: &[u8]) -> Result<()>;
}

#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn get_site(&self, site_id: &str) -> Result<Site>;
    async fn get_log_file(&self, log_file_id: &str) -> Result<LogFile>;
    async fn find_log_file_by_hash(&self, site_id: &str, sha256: &str) -> Result<Option<LogFile>>;
    async fn save_log_file(&self, log_file: &LogFile) -> Result<()>;
    async fn save_parse_quality(&self, log_file_id: &str, quality: &ParseQuality) -> Result<()>;
}

/// Hourly aggregate persistence with commutative-additive upsert (§4.4).
#[async_trait]
pub trait AggregateStore: Send + Sync {
    async fn upsert_hourly(&self, aggregate: &HourlyAggregate) -> Result<()>;
    async fn get_hourly(&self, site_id: &str, hour_bucket: DateTime<Utc>) -> Result<Option<HourlyAggregate>>;
    /// Hours in `[from, to)` for a site, used to build the anomaly
    /// detector's baseline window (§4.6).
    async fn list_hourly_range(&self, site_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<HourlyAggregate>>;
}

/// Security-rule and anomaly findings, upserted by fingerprint (§4.5 step
/// "Idempotence across runs", §4.6).
#[async_trait]
pub trait FindingStore: Send + Sync {
    async fn upsert_finding(&self, finding: &Finding) -> Result<()>;
    async fn get_finding_by_fingerprint(&self, site_id: &str, fingerprint: &str) -> Result<Option<Finding>>;
}

/// Error-group fingerprint table and its occurrence rows (§4.7).
#[async_trait]
pub trait ErrorGroupStore: Send + Sync {
    async fn get_error_group(&self, site_id: &str, fingerprint: &str) -> Result<Option<ErrorGroup>>;
    async fn save_error_group(&self, group: &ErrorGroup) -> Result<()>;
    async fn save_occurrence(&self, occurrence: &ErrorOccurrence) -> Result<()>;
}

/// Progress events emitted by the pipeline driver (§4.8). The external job
/// queue/SSE surface that consumes these is out of scope (§1); only this
/// interface is modeled.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, log_file_id: &str, percent: u8, message: &str) -> Result<()>;
}
