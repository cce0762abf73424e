//! Hourly aggregation stage (§4.4).
//!
//! Partitions a site's filtered event stream into `HourlyAggregate` buckets
//! keyed by `floor(timestamp, 1h)` in UTC, entirely in memory; flushing to a
//! [`crate::dal::traits::AggregateStore`] is the caller's job (see
//! [`crate::pipeline`]), so this stage stays pure and easy to test.

use crate::models::{HourlyAggregate, NormalizedEvent};
use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::BTreeMap;

/// Events processed between progress reports (§4.4 "at least every 10,000
/// events").
pub const PROGRESS_INTERVAL: u64 = 10_000;

pub fn hour_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .expect("valid hour component")
        .and_utc()
}

/// Progress reported to the pipeline driver as the aggregator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorProgress {
    pub lines_processed: u64,
    pub last_hour_flushed: Option<DateTime<Utc>>,
}

/// Aggregates one site's event stream into per-hour buckets, reporting
/// progress through `on_progress` at [`PROGRESS_INTERVAL`] cadence.
pub struct Aggregator {
    site_id: String,
    buckets: BTreeMap<DateTime<Utc>, HourlyAggregate>,
    events_since_progress: u64,
    total_events: u64,
}

impl Aggregator {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            buckets: BTreeMap::new(),
            events_since_progress: 0,
            total_events: 0,
        }
    }

    /// Fold one event into its hour bucket.
    pub fn observe(&mut self, event: &NormalizedEvent) {
        let bucket = hour_bucket(event.timestamp);
        let site_id = self.site_id.clone();
        let agg = self
            .buckets
            .entry(bucket)
            .or_insert_with(|| HourlyAggregate::new(site_id, bucket));

        agg.requests_count += 1;
        agg.total_bytes += event.bytes_sent;
        match event.status_class() {
            Some(2) => agg.status_2xx += 1,
            Some(3) => agg.status_3xx += 1,
            Some(4) => agg.status_4xx += 1,
            Some(5) => agg.status_5xx += 1,
            _ => agg.unclassified += 1,
        }
        agg.seen_ips.insert(event.ip.clone());
        agg.top_paths.observe(&event.path);
        agg.top_ips.observe(&event.ip);
        if let Some(ua) = &event.user_agent {
            agg.top_user_agents.observe(ua);
        }
        agg.top_status_codes.observe(&event.status.to_string());

        self.total_events += 1;
        self.events_since_progress += 1;
    }

    /// Fold `events` into the aggregator, calling `on_progress` at least
    /// every [`PROGRESS_INTERVAL`] events and once more after the last one
    /// (§4.4, supplemented per SPEC_FULL.md B).
    pub fn run<F: FnMut(AggregatorProgress)>(&mut self, events: &[NormalizedEvent], mut on_progress: F) {
        on_progress(AggregatorProgress { lines_processed: self.total_events, last_hour_flushed: None });

        for event in events {
            let bucket = hour_bucket(event.timestamp);
            self.observe(event);
            if self.events_since_progress >= PROGRESS_INTERVAL {
                self.events_since_progress = 0;
                on_progress(AggregatorProgress {
                    lines_processed: self.total_events,
                    last_hour_flushed: Some(bucket),
                });
            }
        }

        let last_bucket = self.buckets.keys().next_back().copied();
        on_progress(AggregatorProgress { lines_processed: self.total_events, last_hour_flushed: last_bucket });
    }

    /// Finalize `unique_ips` on every touched bucket and hand them over for
    /// persistence, consuming the aggregator.
    pub fn into_buckets(self) -> Vec<HourlyAggregate> {
        self.buckets
            .into_values()
            .map(|mut agg| {
                agg.finalize();
                agg
            })
            .collect()
    }

    /// The set of hour buckets touched this run, in chronological order —
    /// the "freshly-touched hours" the anomaly detector scans (§4.6).
    pub fn touched_hours(&self) -> Vec<DateTime<Utc>> {
        self.buckets.keys().copied().collect()
    }
}

/// `[start, end)` baseline window for hour `h`, excluding `h` itself (§4.6
/// step 1).
pub fn baseline_window(h: DateTime<Utc>, baseline_days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    (h - Duration::days(baseline_days), h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(ts: DateTime<Utc>, ip: &str, status: u16) -> NormalizedEvent {
        NormalizedEvent {
            timestamp: ts,
            ip: ip.to_string(),
            method: "GET".to_string(),
            path: "/".to_string(),
            status,
            bytes_sent: 100,
            referer: None,
            user_agent: Some("curl".to_string()),
            user: None,
            protocol: "HTTP/1.1".to_string(),
            line_number: 1,
            raw: String::new(),
        }
    }

    #[test]
    fn buckets_by_hour_and_counts_status_classes() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 23, 10, 5, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 23, 10, 55, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 23, 11, 1, 0).unwrap();

        let mut agg = Aggregator::new("site1");
        agg.run(&[event_at(t0, "1.1.1.1", 200), event_at(t1, "1.1.1.2", 404), event_at(t2, "1.1.1.1", 200)], |_| {});

        let buckets = agg.into_buckets();
        assert_eq!(buckets.len(), 2);
        let hour10 = buckets.iter().find(|b| b.hour_bucket.hour() == 10).unwrap();
        assert_eq!(hour10.requests_count, 2);
        assert_eq!(hour10.status_2xx, 1);
        assert_eq!(hour10.status_4xx, 1);
        assert_eq!(hour10.unique_ips, 2);
    }

    #[test]
    fn progress_reports_at_start_and_end_for_small_batches() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 23, 10, 0, 0).unwrap();
        let mut agg = Aggregator::new("site1");
        let mut reports = Vec::new();
        agg.run(&[event_at(t0, "1.1.1.1", 200)], |p| reports.push(p));
        // one at start (0 processed), one at end (1 processed)
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].lines_processed, 0);
        assert_eq!(reports[1].lines_processed, 1);
    }
}
