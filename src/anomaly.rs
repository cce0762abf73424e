//! Anomaly detector (§4.6).
//!
//! Runs after the aggregator finishes for a file, scanning each
//! freshly-touched hour bucket against a trailing baseline built from the
//! site's history. Surfaced through the same [`Finding`] channel as the
//! rule engine, with `finding_type` prefixed `anomaly.`.

use crate::models::{AnomalyParams, Finding, HourlyAggregate, Severity};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

const EPSILON: f64 = 1.0;
const REQUESTS_FLOOR: u64 = 200;
const ERRORS_FLOOR: u64 = 10;

fn fingerprint(site_id: &str, hour_bucket: DateTime<Utc>, anomaly_type: &str, subject: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(site_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(hour_bucket.to_rfc3339().as_bytes());
    hasher.update(b"\0");
    hasher.update(anomaly_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(subject.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn z_score(value: f64, baseline: &[f64]) -> f64 {
    let mu = mean(baseline);
    let sigma = population_stddev(baseline, mu);
    (value - mu) / sigma.max(EPSILON)
}

/// One hour's baseline: the same site's hours in `[h - baseline_days, h)`,
/// excluding `h` itself.
pub struct Baseline<'a> {
    pub hours: &'a [HourlyAggregate],
}

impl<'a> Baseline<'a> {
    fn requests(&self) -> Vec<f64> {
        self.hours.iter().map(|h| h.requests_count as f64).collect()
    }

    fn error_totals(&self) -> Vec<f64> {
        self.hours.iter().map(|h| (h.status_4xx + h.status_5xx) as f64).collect()
    }

    fn all_paths(&self) -> HashSet<String> {
        self.hours.iter().flat_map(|h| h.top_paths.top(usize::MAX)).map(|e| e.key).collect()
    }
}

/// Evaluate hour `target` against `baseline`, emitting 0..N anomaly
/// findings (§4.6 steps 2-5).
pub fn evaluate_hour(site_id: &str, target: &HourlyAggregate, baseline: &Baseline, params: &AnomalyParams) -> Vec<Finding> {
    if baseline.hours.len() < params.min_baseline_hours {
        return Vec::new();
    }

    let mut findings = Vec::new();

    let requests_baseline = baseline.requests();
    let requests_z = z_score(target.requests_count as f64, &requests_baseline);
    if requests_z >= params.z_threshold && target.requests_count as u64 >= REQUESTS_FLOOR {
        findings.push(traffic_finding(
            site_id,
            target,
            "anomaly.traffic_spike",
            Severity::High,
            requests_z,
            target.requests_count,
        ));
    }

    let error_baseline = baseline.error_totals();
    let target_errors = target.status_4xx + target.status_5xx;
    let errors_z = z_score(target_errors as f64, &error_baseline);
    if errors_z >= params.z_threshold && target_errors >= ERRORS_FLOOR {
        findings.push(traffic_finding(
            site_id,
            target,
            "anomaly.error_spike",
            Severity::Critical,
            errors_z,
            target_errors,
        ));
    }

    let known_paths = baseline.all_paths();
    for entry in target.top_paths.top(usize::MAX) {
        if entry.count >= params.new_path_min_count && !known_paths.contains(&entry.key) {
            findings.push(new_path_finding(site_id, target, &entry.key, entry.count));
        }
    }

    findings
}

fn traffic_finding(
    site_id: &str,
    hour: &HourlyAggregate,
    anomaly_type: &str,
    severity: Severity,
    z: f64,
    value: u64,
) -> Finding {
    let subject = hour.hour_bucket.to_rfc3339();
    Finding {
        site_id: site_id.to_string(),
        finding_type: anomaly_type.to_string(),
        severity,
        title: anomaly_type.replace('.', " ").replace('_', " "),
        description: format!("z={z:.2} value={value} at hour {}", hour.hour_bucket),
        canonical_subject: subject.clone(),
        evidence: Vec::new(),
        fingerprint: fingerprint(site_id, hour.hour_bucket, anomaly_type, &subject),
    }
}

fn new_path_finding(site_id: &str, hour: &HourlyAggregate, path: &str, count: u64) -> Finding {
    Finding {
        site_id: site_id.to_string(),
        finding_type: "anomaly.new_path".to_string(),
        severity: Severity::Medium,
        title: "New path observed".to_string(),
        description: format!("{path} seen {count} time(s) in hour {} with no prior baseline occurrence", hour.hour_bucket),
        canonical_subject: path.to_string(),
        evidence: Vec::new(),
        fingerprint: fingerprint(site_id, hour.hour_bucket, "anomaly.new_path", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn hour_with_requests(base: DateTime<Utc>, offset_hours: i64, requests: u64) -> HourlyAggregate {
        let mut agg = HourlyAggregate::new("site1".to_string(), base + Duration::hours(offset_hours));
        agg.requests_count = requests;
        agg
    }

    #[test]
    fn too_small_baseline_emits_nothing() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let baseline_hours: Vec<_> = (0..5).map(|i| hour_with_requests(base, i, 100)).collect();
        let target = hour_with_requests(base, 5, 5000);
        let params = AnomalyParams::default();
        let findings = evaluate_hour("site1", &target, &Baseline { hours: &baseline_hours }, &params);
        assert!(findings.is_empty());
    }

    #[test]
    fn traffic_spike_detected_above_threshold_and_floor() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let baseline_hours: Vec<_> = (0..24).map(|i| hour_with_requests(base, i, 100)).collect();
        let target = hour_with_requests(base, 24, 5000);
        let params = AnomalyParams::default();
        let findings = evaluate_hour("site1", &target, &Baseline { hours: &baseline_hours }, &params);
        assert!(findings.iter().any(|f| f.finding_type == "anomaly.traffic_spike"));
    }

    #[test]
    fn below_floor_suppresses_spike_even_with_high_z() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        // constant baseline of zero requests gives sigma=0, so any nonzero
        // value has a huge z-score; the floor must still suppress it.
        let baseline_hours: Vec<_> = (0..24).map(|i| hour_with_requests(base, i, 0)).collect();
        let target = hour_with_requests(base, 24, 50);
        let params = AnomalyParams::default();
        let findings = evaluate_hour("site1", &target, &Baseline { hours: &baseline_hours }, &params);
        assert!(findings.iter().all(|f| f.finding_type != "anomaly.traffic_spike"));
    }

    #[test]
    fn fingerprint_is_stable() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 5, 0, 0).unwrap();
        let a = fingerprint("site1", ts, "anomaly.new_path", "/x");
        let b = fingerprint("site1", ts, "anomaly.new_path", "/x");
        assert_eq!(a, b);
    }
}
