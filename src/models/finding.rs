use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// A bounded evidence sample (§3 Finding evidence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub line: u64,
    pub raw: String,
}

/// Maximum evidence samples retained per finding (§3).
pub const MAX_EVIDENCE: usize = 20;

/// A rule-engine or anomaly-detector finding (§3 Finding, §4.5, §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub site_id: String,
    pub finding_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub canonical_subject: String,
    pub evidence: Vec<Evidence>,
    /// Stable fingerprint over `(rule_id/finding_type, site, canonical_subject,
    /// time_window_key)` used to upsert instead of duplicate on re-ingest
    /// (§4.5 "Idempotence across runs").
    pub fingerprint: String,
}

impl Finding {
    pub fn push_evidence(&mut self, ev: Evidence) {
        if self.evidence.len() < MAX_EVIDENCE {
            self.evidence.push(ev);
        }
    }

    /// Merge evidence from a duplicate finding up to the bound, used when a
    /// persisted row already exists for this fingerprint (§5 "Finding rows").
    pub fn merge_evidence_from(&mut self, other: &Finding) {
        for ev in &other.evidence {
            if self.evidence.len() >= MAX_EVIDENCE {
                break;
            }
            if !self.evidence.contains(ev) {
                self.evidence.push(ev.clone());
            }
        }
    }
}
