//! In-memory store backing the crate's integration tests (§8 scenarios),
//! implementing every trait in [`crate::dal::traits`] against plain
//! `HashMap`s guarded by a `tokio::sync::Mutex`.

use super::traits::{AggregateStore, BlobStore, ErrorGroupStore, FindingStore, ProgressSink, SiteStore};
use crate::error::{PipelineError, Result};
use crate::models::{ErrorGroup, ErrorOccurrence, Finding, HourlyAggregate, LogFile, ParseQuality, Site};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    sites: Mutex<HashMap<String, Site>>,
    log_files: Mutex<HashMap<String, LogFile>>,
    parse_quality: Mutex<HashMap<String, ParseQuality>>,
    hourly: Mutex<HashMap<(String, DateTime<Utc>), HourlyAggregate>>,
    findings: Mutex<HashMap<(String, String), Finding>>,
    error_groups: Mutex<HashMap<(String, String), ErrorGroup>>,
    occurrences: Mutex<Vec<ErrorOccurrence>>,
    pub progress_log: Mutex<Vec<(String, u8, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_site(&self, site: Site) {
        self.sites.lock().await.insert(site.id.clone(), site);
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get(&self, storage_key: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .await
            .get(storage_key)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(format!("blob {storage_key} not found")))
    }

    async fn put(&self, storage_key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.lock().await.insert(storage_key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[async_trait]
impl SiteStore for MemoryStore {
    async fn get_site(&self, site_id: &str) -> Result<Site> {
        self.sites
            .lock()
            .await
            .get(site_id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(format!("site {site_id} not found")))
    }

    async fn get_log_file(&self, log_file_id: &str) -> Result<LogFile> {
        self.log_files
            .lock()
            .await
            .get(log_file_id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(format!("log file {log_file_id} not found")))
    }

    async fn find_log_file_by_hash(&self, site_id: &str, sha256: &str) -> Result<Option<LogFile>> {
        Ok(self
            .log_files
            .lock()
            .await
            .values()
            .find(|f| f.site_id == site_id && f.sha256 == sha256)
            .cloned())
    }

    async fn save_log_file(&self, log_file: &LogFile) -> Result<()> {
        self.log_files.lock().await.insert(log_file.id.clone(), log_file.clone());
        Ok(())
    }

    async fn save_parse_quality(&self, log_file_id: &str, quality: &ParseQuality) -> Result<()> {
        self.parse_quality.lock().await.insert(log_file_id.to_string(), *quality);
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn upsert_hourly(&self, aggregate: &HourlyAggregate) -> Result<()> {
        let key = (aggregate.site_id.clone(), aggregate.hour_bucket);
        let mut hourly = self.hourly.lock().await;
        match hourly.get_mut(&key) {
            Some(existing) => existing.merge_additive(aggregate),
            None => {
                hourly.insert(key, aggregate.clone());
            }
        }
        Ok(())
    }

    async fn get_hourly(&self, site_id: &str, hour_bucket: DateTime<Utc>) -> Result<Option<HourlyAggregate>> {
        Ok(self.hourly.lock().await.get(&(site_id.to_string(), hour_bucket)).cloned())
    }

    async fn list_hourly_range(&self, site_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<HourlyAggregate>> {
        let mut hours: Vec<HourlyAggregate> = self
            .hourly
            .lock()
            .await
            .values()
            .filter(|h| h.site_id == site_id && h.hour_bucket >= from && h.hour_bucket < to)
            .cloned()
            .collect();
        hours.sort_by_key(|h| h.hour_bucket);
        Ok(hours)
    }
}

#[async_trait]
impl FindingStore for MemoryStore {
    async fn upsert_finding(&self, finding: &Finding) -> Result<()> {
        let key = (finding.site_id.clone(), finding.fingerprint.clone());
        let mut findings = self.findings.lock().await;
        match findings.get_mut(&key) {
            Some(existing) => existing.merge_evidence_from(finding),
            None => {
                findings.insert(key, finding.clone());
            }
        }
        Ok(())
    }

    async fn get_finding_by_fingerprint(&self, site_id: &str, fingerprint: &str) -> Result<Option<Finding>> {
        Ok(self.findings.lock().await.get(&(site_id.to_string(), fingerprint.to_string())).cloned())
    }
}

#[async_trait]
impl ErrorGroupStore for MemoryStore {
    async fn get_error_group(&self, site_id: &str, fingerprint: &str) -> Result<Option<ErrorGroup>> {
        Ok(self.error_groups.lock().await.get(&(site_id.to_string(), fingerprint.to_string())).cloned())
    }

    async fn save_error_group(&self, group: &ErrorGroup) -> Result<()> {
        let key = (group.site_id.clone(), group.fingerprint.clone());
        self.error_groups.lock().await.insert(key, group.clone());
        Ok(())
    }

    async fn save_occurrence(&self, occurrence: &ErrorOccurrence) -> Result<()> {
        self.occurrences.lock().await.push(occurrence.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for MemoryStore {
    async fn report(&self, log_file_id: &str, percent: u8, message: &str) -> Result<()> {
        self.progress_log.lock().await.push((log_file_id.to_string(), percent, message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn hourly_upsert_is_additive() {
        let store = MemoryStore::new();
        let hour = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut a = HourlyAggregate::new("site1".to_string(), hour);
        a.requests_count = 5;
        let mut b = HourlyAggregate::new("site1".to_string(), hour);
        b.requests_count = 7;

        store.upsert_hourly(&a).await.unwrap();
        store.upsert_hourly(&b).await.unwrap();

        let merged = store.get_hourly("site1", hour).await.unwrap().unwrap();
        assert_eq!(merged.requests_count, 12);
    }

    #[tokio::test]
    async fn blob_roundtrip() {
        let store = MemoryStore::new();
        store.put("k1", b"hello").await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), b"hello");
        assert!(store.get("missing").await.is_err());
    }
}
