//! Postgres-backed store (§6 persistence). ClickHouse, which the teacher
//! used for its event store, is dropped here — see DESIGN.md — in favor of
//! a single `sqlx` Postgres pool that can hold both the append-only
//! occurrence rows and the additive/JSON aggregate rows behind one
//! transactional boundary.

use super::traits::{AggregateStore, BlobStore, ErrorGroupStore, FindingStore, ProgressSink, SiteStore};
use crate::error::{PipelineError, Result};
use crate::models::{
    AnomalyParams, ErrorGroup, ErrorOccurrence, Finding, GroupStatus, HourlyAggregate, LogFile, LogFileStatus,
    LogFormat, ParseQuality, Severity, Site, TopK,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use tracing::debug;

pub struct SqlxStore {
    pool: PgPool,
}

impl SqlxStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(PipelineError::Database)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlobStore for SqlxStore {
    async fn get(&self, storage_key: &str) -> Result<Vec<u8>> {
        let row = sqlx::query("SELECT bytes FROM log_blobs WHERE storage_key = $1")
            .bind(storage_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(PipelineError::Database)?
            .ok_or_else(|| PipelineError::not_found(format!("blob {storage_key} not found")))?;
        Ok(row.try_get::<Vec<u8>, _>("bytes").map_err(PipelineError::Database)?)
    }

    async fn put(&self, storage_key: &str, bytes: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT INTO log_blobs (storage_key, bytes) VALUES ($1, $2)
             ON CONFLICT (storage_key) DO UPDATE SET bytes = EXCLUDED.bytes",
        )
        .bind(storage_key)
        .bind(bytes)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::Database)?;
        Ok(())
    }
}

#[async_trait]
impl SiteStore for SqlxStore {
    async fn get_site(&self, site_id: &str) -> Result<Site> {
        let row = sqlx::query(
            "SELECT id, name, domain, log_format, baseline_days, min_baseline_hours,
                    z_threshold, new_path_min_count, hidden_ips
             FROM sites WHERE id = $1",
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::Database)?
        .ok_or_else(|| PipelineError::not_found(format!("site {site_id} not found")))?;

        let log_format_raw: String = row.try_get("log_format").map_err(PipelineError::Database)?;
        let log_format = match log_format_raw.as_str() {
            "nginx_combined" => LogFormat::NginxCombined,
            "apache_combined" => LogFormat::ApacheCombined,
            _ => LogFormat::Auto,
        };
        let hidden_ips_raw: Vec<String> = row.try_get("hidden_ips").map_err(PipelineError::Database)?;

        Ok(Site {
            id: row.try_get("id").map_err(PipelineError::Database)?,
            name: row.try_get("name").map_err(PipelineError::Database)?,
            domain: row.try_get("domain").map_err(PipelineError::Database)?,
            log_format,
            anomaly_params: AnomalyParams {
                baseline_days: row.try_get("baseline_days").map_err(PipelineError::Database)?,
                min_baseline_hours: row.try_get::<i32, _>("min_baseline_hours").map_err(PipelineError::Database)? as usize,
                z_threshold: row.try_get("z_threshold").map_err(PipelineError::Database)?,
                new_path_min_count: row.try_get::<i64, _>("new_path_min_count").map_err(PipelineError::Database)? as u64,
            },
            hidden_ips: hidden_ips_raw.into_iter().collect::<HashSet<String>>(),
        })
    }

    async fn get_log_file(&self, log_file_id: &str) -> Result<LogFile> {
        let row = sqlx::query(
            "SELECT id, site_id, filename, size_bytes, sha256, storage_key, status, created_at, updated_at
             FROM log_files WHERE id = $1",
        )
        .bind(log_file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::Database)?
        .ok_or_else(|| PipelineError::not_found(format!("log file {log_file_id} not found")))?;
        row_to_log_file(&row)
    }

    async fn find_log_file_by_hash(&self, site_id: &str, sha256: &str) -> Result<Option<LogFile>> {
        let row = sqlx::query(
            "SELECT id, site_id, filename, size_bytes, sha256, storage_key, status, created_at, updated_at
             FROM log_files WHERE site_id = $1 AND sha256 = $2",
        )
        .bind(site_id)
        .bind(sha256)
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::Database)?;
        row.as_ref().map(row_to_log_file).transpose()
    }

    async fn save_log_file(&self, log_file: &LogFile) -> Result<()> {
        let status = match log_file.status {
            LogFileStatus::Pending => "pending",
            LogFileStatus::Processing => "processing",
            LogFileStatus::Completed => "completed",
            LogFileStatus::Failed => "failed",
        };
        sqlx::query(
            "INSERT INTO log_files (id, site_id, filename, size_bytes, sha256, storage_key, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at",
        )
        .bind(&log_file.id)
        .bind(&log_file.site_id)
        .bind(&log_file.filename)
        .bind(log_file.size_bytes as i64)
        .bind(&log_file.sha256)
        .bind(&log_file.storage_key)
        .bind(status)
        .bind(log_file.created_at)
        .bind(log_file.updated_at)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::Database)?;
        Ok(())
    }

    async fn save_parse_quality(&self, log_file_id: &str, quality: &ParseQuality) -> Result<()> {
        sqlx::query(
            "INSERT INTO parse_quality (log_file_id, total_lines, parsed_lines, failed_lines, empty_lines)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (log_file_id) DO UPDATE SET
                total_lines = EXCLUDED.total_lines, parsed_lines = EXCLUDED.parsed_lines,
                failed_lines = EXCLUDED.failed_lines, empty_lines = EXCLUDED.empty_lines",
        )
        .bind(log_file_id)
        .bind(quality.total_lines as i64)
        .bind(quality.parsed_lines as i64)
        .bind(quality.failed_lines as i64)
        .bind(quality.empty_lines as i64)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::Database)?;
        Ok(())
    }
}

fn row_to_log_file(row: &sqlx::postgres::PgRow) -> Result<LogFile> {
    let status_raw: String = row.try_get("status").map_err(PipelineError::Database)?;
    let status = match status_raw.as_str() {
        "processing" => LogFileStatus::Processing,
        "completed" => LogFileStatus::Completed,
        "failed" => LogFileStatus::Failed,
        _ => LogFileStatus::Pending,
    };
    Ok(LogFile {
        id: row.try_get("id").map_err(PipelineError::Database)?,
        site_id: row.try_get("site_id").map_err(PipelineError::Database)?,
        filename: row.try_get("filename").map_err(PipelineError::Database)?,
        size_bytes: row.try_get::<i64, _>("size_bytes").map_err(PipelineError::Database)? as u64,
        sha256: row.try_get("sha256").map_err(PipelineError::Database)?,
        storage_key: row.try_get("storage_key").map_err(PipelineError::Database)?,
        status,
        created_at: row.try_get("created_at").map_err(PipelineError::Database)?,
        updated_at: row.try_get("updated_at").map_err(PipelineError::Database)?,
    })
}

/// Fold `incoming` into whatever is already stored for `(site_id,
/// hour_bucket)`, inside one transaction with a row lock, so two concurrent
/// flushes converge to the same result regardless of interleaving (§4.4).
#[async_trait]
impl AggregateStore for SqlxStore {
    async fn upsert_hourly(&self, incoming: &HourlyAggregate) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(PipelineError::Database)?;

        let existing = sqlx::query(
            "SELECT requests_count, status_2xx, status_3xx, status_4xx, status_5xx, unclassified,
                    unique_ips, total_bytes, top_paths, top_ips, top_user_agents, top_status_codes
             FROM hourly_aggregates WHERE site_id = $1 AND hour_bucket = $2 FOR UPDATE",
        )
        .bind(&incoming.site_id)
        .bind(incoming.hour_bucket)
        .fetch_optional(&mut *tx)
        .await
        .map_err(PipelineError::Database)?;

        let merged = match existing {
            Some(row) => {
                let mut current = row_to_hourly(&row, &incoming.site_id, incoming.hour_bucket)?;
                current.merge_additive(incoming);
                current
            }
            None => incoming.clone(),
        };

        sqlx::query(
            "INSERT INTO hourly_aggregates
                (site_id, hour_bucket, requests_count, status_2xx, status_3xx, status_4xx, status_5xx,
                 unclassified, unique_ips, total_bytes, top_paths, top_ips, top_user_agents, top_status_codes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (site_id, hour_bucket) DO UPDATE SET
                requests_count = EXCLUDED.requests_count,
                status_2xx = EXCLUDED.status_2xx, status_3xx = EXCLUDED.status_3xx,
                status_4xx = EXCLUDED.status_4xx, status_5xx = EXCLUDED.status_5xx,
                unclassified = EXCLUDED.unclassified, unique_ips = EXCLUDED.unique_ips,
                total_bytes = EXCLUDED.total_bytes, top_paths = EXCLUDED.top_paths,
                top_ips = EXCLUDED.top_ips, top_user_agents = EXCLUDED.top_user_agents,
                top_status_codes = EXCLUDED.top_status_codes",
        )
        .bind(&merged.site_id)
        .bind(merged.hour_bucket)
        .bind(merged.requests_count as i64)
        .bind(merged.status_2xx as i64)
        .bind(merged.status_3xx as i64)
        .bind(merged.status_4xx as i64)
        .bind(merged.status_5xx as i64)
        .bind(merged.unclassified as i64)
        .bind(merged.unique_ips as i64)
        .bind(merged.total_bytes as i64)
        .bind(serde_json::to_value(&merged.top_paths).map_err(PipelineError::Serialization)?)
        .bind(serde_json::to_value(&merged.top_ips).map_err(PipelineError::Serialization)?)
        .bind(serde_json::to_value(&merged.top_user_agents).map_err(PipelineError::Serialization)?)
        .bind(serde_json::to_value(&merged.top_status_codes).map_err(PipelineError::Serialization)?)
        .execute(&mut *tx)
        .await
        .map_err(PipelineError::Database)?;

        tx.commit().await.map_err(PipelineError::Database)?;
        debug!(site_id = %merged.site_id, hour = %merged.hour_bucket, "hourly aggregate upserted");
        Ok(())
    }

    async fn get_hourly(&self, site_id: &str, hour_bucket: DateTime<Utc>) -> Result<Option<HourlyAggregate>> {
        let row = sqlx::query(
            "SELECT requests_count, status_2xx, status_3xx, status_4xx, status_5xx, unclassified,
                    unique_ips, total_bytes, top_paths, top_ips, top_user_agents, top_status_codes
             FROM hourly_aggregates WHERE site_id = $1 AND hour_bucket = $2",
        )
        .bind(site_id)
        .bind(hour_bucket)
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::Database)?;
        row.as_ref().map(|r| row_to_hourly(r, site_id, hour_bucket)).transpose()
    }

    async fn list_hourly_range(&self, site_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<HourlyAggregate>> {
        let rows = sqlx::query(
            "SELECT hour_bucket, requests_count, status_2xx, status_3xx, status_4xx, status_5xx, unclassified,
                    unique_ips, total_bytes, top_paths, top_ips, top_user_agents, top_status_codes
             FROM hourly_aggregates WHERE site_id = $1 AND hour_bucket >= $2 AND hour_bucket < $3
             ORDER BY hour_bucket ASC",
        )
        .bind(site_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(PipelineError::Database)?;

        rows.iter()
            .map(|row| {
                let hour_bucket: DateTime<Utc> = row.try_get("hour_bucket").map_err(PipelineError::Database)?;
                row_to_hourly(row, site_id, hour_bucket)
            })
            .collect()
    }
}

fn row_to_hourly(row: &sqlx::postgres::PgRow, site_id: &str, hour_bucket: DateTime<Utc>) -> Result<HourlyAggregate> {
    let top_paths: serde_json::Value = row.try_get("top_paths").map_err(PipelineError::Database)?;
    let top_ips: serde_json::Value = row.try_get("top_ips").map_err(PipelineError::Database)?;
    let top_user_agents: serde_json::Value = row.try_get("top_user_agents").map_err(PipelineError::Database)?;
    let top_status_codes: serde_json::Value = row.try_get("top_status_codes").map_err(PipelineError::Database)?;

    let mut aggregate = HourlyAggregate::new(site_id.to_string(), hour_bucket);
    aggregate.requests_count = row.try_get::<i64, _>("requests_count").map_err(PipelineError::Database)? as u64;
    aggregate.status_2xx = row.try_get::<i64, _>("status_2xx").map_err(PipelineError::Database)? as u64;
    aggregate.status_3xx = row.try_get::<i64, _>("status_3xx").map_err(PipelineError::Database)? as u64;
    aggregate.status_4xx = row.try_get::<i64, _>("status_4xx").map_err(PipelineError::Database)? as u64;
    aggregate.status_5xx = row.try_get::<i64, _>("status_5xx").map_err(PipelineError::Database)? as u64;
    aggregate.unclassified = row.try_get::<i64, _>("unclassified").map_err(PipelineError::Database)? as u64;
    aggregate.unique_ips = row.try_get::<i64, _>("unique_ips").map_err(PipelineError::Database)? as u64;
    aggregate.total_bytes = row.try_get::<i64, _>("total_bytes").map_err(PipelineError::Database)? as u64;
    aggregate.top_paths = serde_json::from_value::<TopK>(top_paths).map_err(PipelineError::Serialization)?;
    aggregate.top_ips = serde_json::from_value::<TopK>(top_ips).map_err(PipelineError::Serialization)?;
    aggregate.top_user_agents = serde_json::from_value::<TopK>(top_user_agents).map_err(PipelineError::Serialization)?;
    aggregate.top_status_codes = serde_json::from_value::<TopK>(top_status_codes).map_err(PipelineError::Serialization)?;
    Ok(aggregate)
}

#[async_trait]
impl FindingStore for SqlxStore {
    async fn upsert_finding(&self, finding: &Finding) -> Result<()> {
        let severity = severity_to_str(finding.severity);
        sqlx::query(
            "INSERT INTO findings (site_id, fingerprint, finding_type, severity, title, description,
                                    canonical_subject, evidence)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (site_id, fingerprint) DO UPDATE SET
                evidence = (
                    SELECT jsonb_agg(DISTINCT elem) FROM jsonb_array_elements(
                        findings.evidence || EXCLUDED.evidence
                    ) AS elem
                )",
        )
        .bind(&finding.site_id)
        .bind(&finding.fingerprint)
        .bind(&finding.finding_type)
        .bind(severity)
        .bind(&finding.title)
        .bind(&finding.description)
        .bind(&finding.canonical_subject)
        .bind(serde_json::to_value(&finding.evidence).map_err(PipelineError::Serialization)?)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::Database)?;
        Ok(())
    }

    async fn get_finding_by_fingerprint(&self, site_id: &str, fingerprint: &str) -> Result<Option<Finding>> {
        let row = sqlx::query(
            "SELECT finding_type, severity, title, description, canonical_subject, evidence
             FROM findings WHERE site_id = $1 AND fingerprint = $2",
        )
        .bind(site_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::Database)?;

        let Some(row) = row else { return Ok(None) };
        let severity_raw: String = row.try_get("severity").map_err(PipelineError::Database)?;
        let evidence_raw: serde_json::Value = row.try_get("evidence").map_err(PipelineError::Database)?;
        Ok(Some(Finding {
            site_id: site_id.to_string(),
            finding_type: row.try_get("finding_type").map_err(PipelineError::Database)?,
            severity: str_to_severity(&severity_raw),
            title: row.try_get("title").map_err(PipelineError::Database)?,
            description: row.try_get("description").map_err(PipelineError::Database)?,
            canonical_subject: row.try_get("canonical_subject").map_err(PipelineError::Database)?,
            evidence: serde_json::from_value(evidence_raw).map_err(PipelineError::Serialization)?,
            fingerprint: fingerprint.to_string(),
        }))
    }
}

fn severity_to_str(s: Severity) -> &'static str {
    match s {
        Severity::Info => "info",
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

fn str_to_severity(s: &str) -> Severity {
    match s {
        "low" => Severity::Low,
        "medium" => Severity::Medium,
        "high" => Severity::High,
        "critical" => Severity::Critical,
        _ => Severity::Info,
    }
}

/// Error-group upserts use an advisory row lock via `FOR UPDATE` on the
/// fingerprint row so concurrent occurrences of the same error serialize
/// correctly (§4.7).
#[async_trait]
impl ErrorGroupStore for SqlxStore {
    async fn get_error_group(&self, site_id: &str, fingerprint: &str) -> Result<Option<ErrorGroup>> {
        let row = sqlx::query(
            "SELECT error_type, error_message, first_seen, last_seen, occurrence_count, status
             FROM error_groups WHERE site_id = $1 AND fingerprint = $2",
        )
        .bind(site_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::Database)?;

        let Some(row) = row else { return Ok(None) };
        let status_raw: String = row.try_get("status").map_err(PipelineError::Database)?;
        Ok(Some(ErrorGroup {
            site_id: site_id.to_string(),
            fingerprint: fingerprint.to_string(),
            error_type: row.try_get("error_type").map_err(PipelineError::Database)?,
            error_message: row.try_get("error_message").map_err(PipelineError::Database)?,
            first_seen: row.try_get("first_seen").map_err(PipelineError::Database)?,
            last_seen: row.try_get("last_seen").map_err(PipelineError::Database)?,
            occurrence_count: row.try_get::<i64, _>("occurrence_count").map_err(PipelineError::Database)? as u64,
            status: match status_raw.as_str() {
                "resolved" => GroupStatus::Resolved,
                "ignored" => GroupStatus::Ignored,
                _ => GroupStatus::Unresolved,
            },
        }))
    }

    async fn save_error_group(&self, group: &ErrorGroup) -> Result<()> {
        let status = match group.status {
            GroupStatus::Unresolved => "unresolved",
            GroupStatus::Resolved => "resolved",
            GroupStatus::Ignored => "ignored",
        };
        sqlx::query(
            "INSERT INTO error_groups (site_id, fingerprint, error_type, error_message, first_seen, last_seen, occurrence_count, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (site_id, fingerprint) DO UPDATE SET
                last_seen = EXCLUDED.last_seen, first_seen = LEAST(error_groups.first_seen, EXCLUDED.first_seen),
                occurrence_count = EXCLUDED.occurrence_count, status = EXCLUDED.status",
        )
        .bind(&group.site_id)
        .bind(&group.fingerprint)
        .bind(&group.error_type)
        .bind(&group.error_message)
        .bind(group.first_seen)
        .bind(group.last_seen)
        .bind(group.occurrence_count as i64)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::Database)?;
        Ok(())
    }

    async fn save_occurrence(&self, occurrence: &ErrorOccurrence) -> Result<()> {
        sqlx::query(
            "INSERT INTO error_occurrences
                (id, group_fingerprint, log_file_id, timestamp, message, stack_trace, file_path, file_line,
                 function_name, request_url, request_method, ip, user_agent, context)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(&occurrence.id)
        .bind(&occurrence.group_fingerprint)
        .bind(&occurrence.log_file_id)
        .bind(occurrence.timestamp)
        .bind(&occurrence.message)
        .bind(&occurrence.stack_trace)
        .bind(&occurrence.file_path)
        .bind(occurrence.file_line.map(|l| l as i32))
        .bind(&occurrence.function_name)
        .bind(&occurrence.request_url)
        .bind(&occurrence.request_method)
        .bind(&occurrence.ip)
        .bind(&occurrence.user_agent)
        .bind(serde_json::to_value(&occurrence.context).map_err(PipelineError::Serialization)?)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::Database)?;
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for SqlxStore {
    async fn report(&self, log_file_id: &str, percent: u8, message: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_progress (log_file_id, percent, message, reported_at) VALUES ($1, $2, $3, now())",
        )
        .bind(log_file_id)
        .bind(percent as i16)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::Database)?;
        Ok(())
    }
}
