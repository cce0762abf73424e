use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bound on the number of keys a [`TopK`] reports (§4.4).
pub const TOP_K: usize = 10;
/// Exact map is kept up to `4*K` keys before the bounded-multiset
/// approximation starts evicting the lowest-count entry (§4.4).
const TOPK_CAPACITY: usize = 4 * TOP_K;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopKEntry {
    pub key: String,
    pub count: u64,
}

/// A bounded-multiset Top-K summary (§4.4, §9 "Top-K").
///
/// Counts for keys already tracked are never decreased. Once the tracked
/// set reaches `4*K` entries, an insert of a previously-unseen key evicts
/// the current lowest-count entry. This keeps the structure exact for any
/// key that ends up in the eventual top-K, at the cost of being only an
/// approximation for keys that never make the cut — which is fine, since
/// only the top-K is ever read back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopK {
    counts: HashMap<String, u64>,
}

impl TopK {
    pub fn new() -> Self {
        Self { counts: HashMap::new() }
    }

    pub fn observe(&mut self, key: &str) {
        self.observe_n(key, 1);
    }

    pub fn observe_n(&mut self, key: &str, n: u64) {
        if let Some(c) = self.counts.get_mut(key) {
            *c += n;
            return;
        }
        if self.counts.len() < TOPK_CAPACITY {
            self.counts.insert(key.to_string(), n);
            return;
        }
        // Evict the current lowest-count entry unconditionally, breaking
        // ties lexicographically so eviction is deterministic. A later
        // insert of an as-yet-single-count key must still be able to
        // displace an entry that is no longer among the true top counts
        // (§4.4) — a high-frequency key always starts at count 1.
        if let Some(lowest_key) = self
            .counts
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(k, _)| k.clone())
        {
            self.counts.remove(&lowest_key);
            self.counts.insert(key.to_string(), n);
        }
    }

    /// Merge another summary's counts into this one by summing counts per
    /// key — the commutative-additive merge required for concurrent
    /// flushes of the same bucket (§4.4).
    pub fn merge(&mut self, other: &TopK) {
        for (key, count) in &other.counts {
            self.observe_n(key, *count);
        }
    }

    /// The top `k` entries by count descending, lexicographic tie-break on
    /// the key.
    pub fn top(&self, k: usize) -> Vec<TopKEntry> {
        let mut entries: Vec<TopKEntry> = self
            .counts
            .iter()
            .map(|(key, count)| TopKEntry { key: key.clone(), count: *count })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        entries.truncate(k);
        entries
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// One row per `(site, hour_bucket)` (§3 HourlyAggregate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub site_id: String,
    pub hour_bucket: DateTime<Utc>,
    pub requests_count: u64,
    pub status_2xx: u64,
    pub status_3xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
    pub unclassified: u64,
    pub unique_ips: u64,
    pub total_bytes: u64,
    pub top_paths: TopK,
    pub top_ips: TopK,
    pub top_user_agents: TopK,
    pub top_status_codes: TopK,
    /// Distinct-IP set kept while the bucket stays in memory; its
    /// cardinality becomes `unique_ips` on flush (§4.4). Not serialized to
    /// the persistent row.
    #[serde(skip)]
    pub(crate) seen_ips: std::collections::HashSet<String>,
}

impl HourlyAggregate {
    pub fn new(site_id: String, hour_bucket: DateTime<Utc>) -> Self {
        Self {
            site_id,
            hour_bucket,
            requests_count: 0,
            status_2xx: 0,
            status_3xx: 0,
            status_4xx: 0,
            status_5xx: 0,
            unclassified: 0,
            unique_ips: 0,
            total_bytes: 0,
            top_paths: TopK::new(),
            top_ips: TopK::new(),
            top_user_agents: TopK::new(),
            top_status_codes: TopK::new(),
            seen_ips: std::collections::HashSet::new(),
        }
    }

    /// Additive merge used when upserting a persisted row with a freshly
    /// computed in-memory bucket (§4.4 "commutative-additive"). `unique_ips`
    /// is treated as an additive upper-bound estimate across runs, per the
    /// documented open question; a full-reprocess path recomputes it from
    /// scratch instead of calling this.
    pub fn merge_additive(&mut self, other: &HourlyAggregate) {
        self.requests_count += other.requests_count;
        self.status_2xx += other.status_2xx;
        self.status_3xx += other.status_3xx;
        self.status_4xx += other.status_4xx;
        self.status_5xx += other.status_5xx;
        self.unclassified += other.unclassified;
        self.total_bytes += other.total_bytes;
        self.unique_ips += other.unique_ips;
        self.top_paths.merge(&other.top_paths);
        self.top_ips.merge(&other.top_ips);
        self.top_user_agents.merge(&other.top_user_agents);
        self.top_status_codes.merge(&other.top_status_codes);
    }

    /// Finalize `unique_ips` from the in-memory distinct-IP set before
    /// flushing (§4.4).
    pub fn finalize(&mut self) {
        self.unique_ips = self.seen_ips.len() as u64;
    }
}
