//! Rule-engine coverage across the §4.5 built-ins (§8 scenario S3), driven
//! through the public crate API.

use chrono::{Duration, TimeZone, Utc};
use logamizer::models::{NormalizedEvent, Severity};
use logamizer::rules::RuleEngine;

fn event(ts: chrono::DateTime<Utc>, ip: &str, path: &str, status: u16, ua: Option<&str>) -> NormalizedEvent {
    NormalizedEvent {
        timestamp: ts,
        ip: ip.to_string(),
        method: "GET".to_string(),
        path: path.to_string(),
        status,
        bytes_sent: 0,
        referer: None,
        user_agent: ua.map(str::to_string),
        user: None,
        protocol: "HTTP/1.1".to_string(),
        line_number: 1,
        raw: format!("{ip} {path} {status}"),
    }
}

#[test]
fn sqli_signature_and_suspicious_user_agent_both_fire() {
    let mut engine = RuleEngine::new("site1");
    let ts = Utc.with_ymd_and_hms(2026, 1, 23, 10, 0, 0).unwrap();

    engine.observe(&event(ts, "5.5.5.5", "/search?q=1 UNION SELECT password FROM users", 200, Some("sqlmap/1.7")));
    let findings = engine.finish();

    assert!(findings.iter().any(|f| f.finding_type == "rule.sqli_xss_signature"));
    assert!(findings.iter().any(|f| f.finding_type == "rule.suspicious_ua"));
}

#[test]
fn brute_force_threshold_trips_on_repeated_auth_failures() {
    let mut engine = RuleEngine::new("site1");
    let start = Utc.with_ymd_and_hms(2026, 1, 23, 10, 0, 0).unwrap();

    for i in 0..12 {
        engine.observe(&event(start + Duration::seconds(i), "7.7.7.7", "/login", 401, None));
    }
    let findings = engine.finish();
    let found = findings.iter().find(|f| f.finding_type == "rule.brute_force").unwrap();
    assert_eq!(found.canonical_subject, "7.7.7.7");
}

#[test]
fn sensitive_file_exposure_requires_a_2xx_response() {
    let mut engine = RuleEngine::new("site1");
    let ts = Utc.with_ymd_and_hms(2026, 1, 23, 10, 0, 0).unwrap();

    engine.observe(&event(ts, "1.1.1.1", "/.env", 404, None));
    engine.observe(&event(ts, "1.1.1.2", "/.env", 200, None));
    let findings = engine.finish();

    let exposures: Vec<_> = findings.iter().filter(|f| f.finding_type == "rule.sensitive_file_exposure").collect();
    assert_eq!(exposures.len(), 1);
    assert_eq!(exposures[0].canonical_subject, "/.env");
}

#[test]
fn high_5xx_from_single_client_escalates_as_medium() {
    let mut engine = RuleEngine::new("site1");
    let start = Utc.with_ymd_and_hms(2026, 1, 23, 10, 0, 0).unwrap();

    for i in 0..22 {
        engine.observe(&event(start + Duration::seconds(i), "2.2.2.2", "/checkout", 503, None));
    }
    let findings = engine.finish();
    let found = findings.iter().find(|f| f.finding_type == "rule.high_5xx_single_client").unwrap();
    assert_eq!(found.severity, Severity::Medium);
}
