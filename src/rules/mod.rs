//! Security rule engine (§4.5).
//!
//! Single-pass and order-preserving: each rule is a state machine seeded at
//! run start and stepped once per event, with no shared mutable state
//! across rules. At end-of-stream each rule emits 0..N findings. Rules
//! assume the event stream is in ascending timestamp order, which holds for
//! a single log file processed top to bottom.

pub mod signatures;

use crate::aggregator::hour_bucket;
use crate::models::{Evidence, Finding, NormalizedEvent, Severity};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

const SCANNER_WINDOW_MINUTES: i64 = 10;
const SCANNER_THRESHOLD: u64 = 20;
const SCANNER_HIGH_THRESHOLD: u64 = 50;

const BRUTE_FORCE_WINDOW_MINUTES: i64 = 5;
const BRUTE_FORCE_THRESHOLD: u64 = 10;

const HIGH_5XX_WINDOW_MINUTES: i64 = 5;
const HIGH_5XX_THRESHOLD: u64 = 20;

fn fingerprint(rule_id: &str, site_id: &str, canonical_subject: &str, time_window_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(site_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_subject.as_bytes());
    hasher.update(b"\0");
    hasher.update(time_window_key.as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take(n).map(|b| format!("{b:02x}")).collect()
}

fn window_key(ts: DateTime<Utc>) -> String {
    hour_bucket(ts).to_rfc3339()
}

/// A rule that is a pure function of the event stream plus its own internal
/// state (§4.5).
pub trait SecurityRule {
    fn observe(&mut self, site_id: &str, event: &NormalizedEvent);
    fn finish(self: Box<Self>, site_id: &str) -> Vec<Finding>;
}

struct SlidingWindowRule {
    rule_id: &'static str,
    title: &'static str,
    window: Duration,
    threshold: u64,
    high_threshold: Option<u64>,
    matches: fn(&NormalizedEvent) -> bool,
    per_key: HashMap<String, SlidingWindowEntry>,
}

struct SlidingWindowEntry {
    events: VecDeque<DateTime<Utc>>,
    evidence: Vec<Evidence>,
    peak_count: u64,
    triggered_at: Option<DateTime<Utc>>,
}

impl SlidingWindowEntry {
    fn new() -> Self {
        Self { events: VecDeque::new(), evidence: Vec::new(), peak_count: 0, triggered_at: None }
    }
}

impl SlidingWindowRule {
    fn new(
        rule_id: &'static str,
        title: &'static str,
        window: Duration,
        threshold: u64,
        high_threshold: Option<u64>,
        matches: fn(&NormalizedEvent) -> bool,
    ) -> Self {
        Self { rule_id, title, window, threshold, high_threshold, matches, per_key: HashMap::new() }
    }
}

impl SecurityRule for SlidingWindowRule {
    fn observe(&mut self, _site_id: &str, event: &NormalizedEvent) {
        if !(self.matches)(event) {
            return;
        }
        let entry = self.per_key.entry(event.ip.clone()).or_insert_with(SlidingWindowEntry::new);
        entry.events.push_back(event.timestamp);
        while let Some(&front) = entry.events.front() {
            if event.timestamp - front > self.window {
                entry.events.pop_front();
            } else {
                break;
            }
        }
        let count = entry.events.len() as u64;
        entry.peak_count = entry.peak_count.max(count);
        if entry.evidence.len() < crate::models::finding::MAX_EVIDENCE {
            entry.evidence.push(Evidence { line: event.line_number, raw: event.raw.clone() });
        }
        if entry.triggered_at.is_none() && count >= self.threshold {
            entry.triggered_at = Some(event.timestamp);
        }
    }

    fn finish(self: Box<Self>, site_id: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (ip, entry) in self.per_key {
            let Some(triggered_at) = entry.triggered_at else { continue };
            let severity = match self.high_threshold {
                Some(high) if entry.peak_count >= high => Severity::High,
                _ => Severity::Medium,
            };
            let window_key = window_key(triggered_at);
            findings.push(Finding {
                site_id: site_id.to_string(),
                finding_type: self.rule_id.to_string(),
                severity,
                title: self.title.to_string(),
                description: format!("{} matching events from {ip} within the tracked window", entry.peak_count),
                canonical_subject: ip.clone(),
                evidence: entry.evidence,
                fingerprint: fingerprint(self.rule_id, site_id, &ip, &window_key),
            });
        }
        findings
    }
}

/// Groups evidence by an arbitrary subject key built from the matching
/// event, firing one finding per subject once the stream ends.
struct PatternMatchRule {
    rule_id: &'static str,
    title: &'static str,
    severity: Severity,
    classify: fn(&NormalizedEvent) -> Option<(String, &'static str)>,
    per_subject: HashMap<String, (Vec<Evidence>, DateTime<Utc>)>,
}

impl PatternMatchRule {
    fn new(
        rule_id: &'static str,
        title: &'static str,
        severity: Severity,
        classify: fn(&NormalizedEvent) -> Option<(String, &'static str)>,
    ) -> Self {
        Self { rule_id, title, severity, classify, per_subject: HashMap::new() }
    }
}

impl SecurityRule for PatternMatchRule {
    fn observe(&mut self, _site_id: &str, event: &NormalizedEvent) {
        let Some((subject, _reason)) = (self.classify)(event) else { return };
        let entry = self.per_subject.entry(subject).or_insert_with(|| (Vec::new(), event.timestamp));
        if entry.0.len() < crate::models::finding::MAX_EVIDENCE {
            entry.0.push(Evidence { line: event.line_number, raw: event.raw.clone() });
        }
        entry.1 = event.timestamp;
    }

    fn finish(self: Box<Self>, site_id: &str) -> Vec<Finding> {
        self.per_subject
            .into_iter()
            .map(|(subject, (evidence, last_seen))| {
                let window_key = window_key(last_seen);
                Finding {
                    site_id: site_id.to_string(),
                    finding_type: self.rule_id.to_string(),
                    severity: self.severity,
                    title: self.title.to_string(),
                    description: format!("{} matching request(s) for {subject}", evidence.len()),
                    canonical_subject: subject.clone(),
                    evidence,
                    fingerprint: fingerprint(self.rule_id, site_id, &subject, &window_key),
                }
            })
            .collect()
    }
}

fn is_404(event: &NormalizedEvent) -> bool {
    event.status == 404
}

fn is_brute_force_candidate(event: &NormalizedEvent) -> bool {
    event.status_class() == Some(4) && signatures::looks_like_auth_path(&event.path)
}

fn is_5xx(event: &NormalizedEvent) -> bool {
    event.status_class() == Some(5)
}

fn classify_admin_path(event: &NormalizedEvent) -> Option<(String, &'static str)> {
    signatures::matches_admin_path(&event.path).map(|pattern| (format!("{}:{pattern}", event.ip), pattern))
}

fn classify_signature(event: &NormalizedEvent) -> Option<(String, &'static str)> {
    signatures::matches_signature(&event.path).map(|family| (format!("{}:{family}", event.ip), family))
}

fn classify_suspicious_ua(event: &NormalizedEvent) -> Option<(String, &'static str)> {
    let ua = event.user_agent.as_deref()?;
    signatures::matches_suspicious_ua(ua).map(|bad| (ua.to_string(), bad))
}

fn classify_sensitive_file(event: &NormalizedEvent) -> Option<(String, &'static str)> {
    if event.status_class() != Some(2) {
        return None;
    }
    signatures::matches_sensitive_file(&event.path).map(|pattern| (event.path.clone(), pattern))
}

fn classify_traversal(event: &NormalizedEvent) -> Option<(String, &'static str)> {
    if signatures::contains_traversal(&event.path) {
        Some((format!("{}:{}", event.ip, event.path), "traversal"))
    } else {
        None
    }
}

/// Builds the full set of built-in rules (§4.5 table), seeded fresh for one
/// pipeline run.
pub fn builtin_rules() -> Vec<Box<dyn SecurityRule>> {
    vec![
        Box::new(SlidingWindowRule::new(
            "rule.scanner_probing",
            "Scanner probing",
            Duration::minutes(SCANNER_WINDOW_MINUTES),
            SCANNER_THRESHOLD,
            Some(SCANNER_HIGH_THRESHOLD),
            is_404,
        )),
        Box::new(PatternMatchRule::new("rule.admin_path_probe", "Admin path probe", Severity::Medium, classify_admin_path)),
        Box::new(PatternMatchRule::new("rule.sqli_xss_signature", "SQLi/XSS signature", Severity::High, classify_signature)),
        Box::new(SlidingWindowRule::new(
            "rule.brute_force",
            "Brute force",
            Duration::minutes(BRUTE_FORCE_WINDOW_MINUTES),
            BRUTE_FORCE_THRESHOLD,
            None,
            is_brute_force_candidate,
        )),
        Box::new(PatternMatchRule::new("rule.suspicious_ua", "Suspicious user agent", Severity::Medium, classify_suspicious_ua)),
        Box::new(PatternMatchRule::new("rule.sensitive_file_exposure", "Sensitive file exposure", Severity::High, classify_sensitive_file)),
        Box::new(PatternMatchRule::new("rule.directory_traversal", "Directory traversal", Severity::High, classify_traversal)),
        Box::new(SlidingWindowRule::new(
            "rule.high_5xx_single_client",
            "High 5xx from a single client",
            Duration::minutes(HIGH_5XX_WINDOW_MINUTES),
            HIGH_5XX_THRESHOLD,
            None,
            is_5xx,
        )),
    ]
}

/// Drives the built-in rules over a site's filtered event stream for one
/// pipeline run.
pub struct RuleEngine {
    site_id: String,
    rules: Vec<Box<dyn SecurityRule>>,
}

impl RuleEngine {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self { site_id: site_id.into(), rules: builtin_rules() }
    }

    pub fn observe(&mut self, event: &NormalizedEvent) {
        for rule in &mut self.rules {
            rule.observe(&self.site_id, event);
        }
    }

    pub fn finish(self) -> Vec<Finding> {
        let site_id = self.site_id;
        self.rules.into_iter().flat_map(|rule| rule.finish(&site_id)).collect()
    }
}
