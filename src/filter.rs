//! Hidden-IP filter stage (§4.3).
//!
//! Runs in the pipeline between parsing and the fan-out to the aggregator,
//! rule engine, and anomaly detector — not at read time, so the raw
//! uploaded blob and its parse are unaffected by later hidden-IP edits. A
//! site's hidden-IP set can be updated and the file re-ingested to
//! re-materialize aggregates without the filtered IPs.

use crate::models::{NormalizedEvent, Site};

/// Remove events whose source IP is in `site.hidden_ips`, in place.
pub fn filter_events(events: Vec<NormalizedEvent>, site: &Site) -> Vec<NormalizedEvent> {
    events.into_iter().filter(|e| !site.is_hidden(&e.ip)).collect()
}
