//! Error-grouping across repeated, textually-distinct occurrences (§8
//! scenario S6), driven through the public crate API.

use chrono::{Duration, Utc};
use logamizer::error_grouper::{group, upsert_group};
use logamizer::models::event::RawErrorEvent;
use std::collections::BTreeMap;

fn raw(message: &str, at: chrono::DateTime<Utc>) -> RawErrorEvent {
    RawErrorEvent {
        timestamp: at,
        error_type: "error".to_string(),
        message: message.to_string(),
        stack_trace: None,
        file_path: Some("/srv/app/worker.rs".to_string()),
        file_line: Some(42),
        function_name: Some("process_job".to_string()),
        request_url: None,
        request_method: None,
        ip: None,
        user_agent: None,
        context: BTreeMap::new(),
        line_number: 1,
        raw: String::new(),
    }
}

#[test]
fn repeated_errors_with_different_identifiers_collapse_into_one_group() {
    let t0 = Utc::now();
    let occurrences = [
        raw("User '1001' not found after 3 retries", t0),
        raw("User '2002' not found after 3 retries", t0 + Duration::minutes(5)),
        raw("User '3003' not found after 5 retries", t0 + Duration::minutes(10)),
    ];

    let mut site_group = None;
    for occurrence in &occurrences {
        let grouped = group("site1", "lf1", occurrence);
        site_group = Some(upsert_group(
            site_group,
            "site1",
            &grouped.fingerprint,
            &grouped.error_type,
            &grouped.occurrence.message,
            grouped.occurrence.timestamp,
        ));
    }

    let final_group = site_group.unwrap();
    assert_eq!(final_group.occurrence_count, 3);
    assert_eq!(final_group.first_seen, t0);
    assert_eq!(final_group.last_seen, t0 + Duration::minutes(10));
}

#[test]
fn distinct_error_shapes_produce_distinct_groups() {
    let t0 = Utc::now();
    let a = group("site1", "lf1", &raw("disk full on /var/log", t0));
    let b = group("site1", "lf1", &raw("connection refused to database", t0));
    assert_ne!(a.fingerprint, b.fingerprint);
}
