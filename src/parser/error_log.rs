//! Apache error-log, Nginx error-log, and ModSecurity audit-line recognizers
//! (§4.2). Each is tried in turn per line; the first match claims it.
//!
//! ModSecurity audit records are in practice embedded as single Apache
//! error-log lines carrying `[id "..."]`-style tags, so they're recognized
//! as a variant of the Apache line rather than requiring multi-line
//! sectioned-record buffering.

use crate::models::event::RawErrorEvent;
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

// [Wed Oct 11 14:32:52.123456 2023] [core:error] [pid 1234:tid 5678] [client 1.2.3.4:5678] message
static APACHE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^\[(?P<timestamp>\w+\s+\w+\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?\s+\d{4})\]\s+
        \[(?:\w+:)?(?P<level>\w+)\]\s+
        (?:\[pid\s+(?P<pid>\d+)(?::tid\s+\d+)?\]\s+)?
        (?:\[client\s+(?P<client>[^:\]]+)(?::\d+)?\]\s+)?
        (?P<message>.*)$
        "#,
    )
    .expect("failed compiling apache error-log regex")
});

// 2026/01/23 09:12:00 [error] 1234#0: *5 message
static NGINX_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^(?P<timestamp>\d{4}/\d{2}/\d{2}\s+\d{2}:\d{2}:\d{2})\s+
        \[(?P<level>\w+)\]\s+
        (?P<pid>\d+)\#(?P<tid>\d+):\s+
        (?:\*(?P<cid>\d+)\s+)?
        (?P<message>.*)$
        "#,
    )
    .expect("failed compiling nginx error-log regex")
});

static MODSEC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\[id\s+"(?P<id>\d+)"\]"#).unwrap());
static MODSEC_MSG: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\[msg\s+"(?P<msg>[^"]*)"\]"#).unwrap());
static MODSEC_SEVERITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[severity\s+"(?P<severity>[^"]*)"\]"#).unwrap());
static MODSEC_URI: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\[uri\s+"(?P<uri>[^"]*)"\]"#).unwrap());

fn parse_apache_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // Apache's error log has no timezone offset; it's local to the server,
    // which we don't know, so we treat it as UTC rather than guessing.
    for fmt in ["%a %b %d %H:%M:%S%.f %Y", "%a %b %d %H:%M:%S %Y"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    None
}

fn parse_nginx_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y/%m/%d %H:%M:%S")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Map ModSecurity's numeric severity (0 = emergency .. 7 = debug) or its
/// named form to a coarse label stored in `context["severity"]`.
fn normalize_modsec_severity(raw: &str) -> String {
    match raw.trim().to_ascii_uppercase().as_str() {
        "0" | "EMERGENCY" => "critical".into(),
        "1" | "ALERT" | "2" | "CRITICAL" => "critical".into(),
        "3" | "ERROR" => "high".into(),
        "4" | "WARNING" => "medium".into(),
        "5" | "NOTICE" | "6" | "INFO" => "low".into(),
        "7" | "DEBUG" => "info".into(),
        other => other.to_ascii_lowercase(),
    }
}

fn try_modsecurity(line: &str, line_number: u64, timestamp: DateTime<Utc>, client: Option<String>, message: &str) -> Option<RawErrorEvent> {
    let id = MODSEC_ID.captures(message)?.name("id")?.as_str().to_string();
    let msg = MODSEC_MSG
        .captures(message)
        .and_then(|c| c.name("msg").map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| message.to_string());
    let mut context = BTreeMap::new();
    context.insert("rule_id".to_string(), id);
    if let Some(sev) = MODSEC_SEVERITY.captures(message).and_then(|c| c.name("severity").map(|m| m.as_str().to_string())) {
        context.insert("severity".to_string(), normalize_modsec_severity(&sev));
    }
    let request_url = MODSEC_URI
        .captures(message)
        .and_then(|c| c.name("uri").map(|m| m.as_str().to_string()));

    Some(RawErrorEvent {
        timestamp,
        error_type: "modsecurity".to_string(),
        message: msg,
        stack_trace: None,
        file_path: None,
        file_line: None,
        function_name: None,
        request_url,
        request_method: None,
        ip: client,
        user_agent: None,
        context,
        line_number,
        raw: line.to_string(),
    })
}

fn parse_apache_line(line: &str, line_number: u64) -> Option<RawErrorEvent> {
    let caps = APACHE_ERROR.captures(line)?;
    let timestamp = parse_apache_timestamp(&caps["timestamp"])?;
    let message = caps["message"].to_string();
    let client = caps.name("client").map(|m| m.as_str().to_string());

    if message.contains("ModSecurity:") || MODSEC_ID.is_match(&message) {
        if let Some(event) = try_modsecurity(line, line_number, timestamp, client.clone(), &message) {
            return Some(event);
        }
    }

    Some(RawErrorEvent {
        timestamp,
        error_type: caps["level"].to_string(),
        message,
        stack_trace: None,
        file_path: None,
        file_line: None,
        function_name: None,
        request_url: None,
        request_method: None,
        ip: client,
        user_agent: None,
        context: BTreeMap::new(),
        line_number,
        raw: line.to_string(),
    })
}

fn parse_nginx_line(line: &str, line_number: u64) -> Option<RawErrorEvent> {
    let caps = NGINX_ERROR.captures(line)?;
    let timestamp = parse_nginx_timestamp(&caps["timestamp"])?;
    let message = caps["message"].to_string();

    let mut context = BTreeMap::new();
    context.insert("pid".to_string(), caps["pid"].to_string());
    context.insert("tid".to_string(), caps["tid"].to_string());
    if let Some(cid) = caps.name("cid") {
        context.insert("connection_id".to_string(), cid.as_str().to_string());
    }

    Some(RawErrorEvent {
        timestamp,
        error_type: caps["level"].to_string(),
        message,
        stack_trace: None,
        file_path: None,
        file_line: None,
        function_name: None,
        request_url: None,
        request_method: None,
        ip: None,
        user_agent: None,
        context,
        line_number,
        raw: line.to_string(),
    })
}

pub fn parse_line(line: &str, line_number: u64) -> Option<RawErrorEvent> {
    parse_apache_line(line, line_number).or_else(|| parse_nginx_line(line, line_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_apache_error_line() {
        let line = "[Wed Oct 11 14:32:52.123456 2023] [core:error] [pid 1234:tid 5678] [client 203.0.113.9:5555] File does not exist: /var/www/html/favicon.ico";
        let event = parse_line(line, 1).unwrap();
        assert_eq!(event.error_type, "error");
        assert_eq!(event.ip.as_deref(), Some("203.0.113.9"));
        assert!(event.message.contains("favicon.ico"));
    }

    #[test]
    fn parses_nginx_error_line() {
        let line = "2026/01/23 09:12:00 [error] 1234#0: *5 connect() failed (111: Connection refused) while connecting to upstream";
        let event = parse_line(line, 2).unwrap();
        assert_eq!(event.error_type, "error");
        assert_eq!(event.context.get("connection_id").map(String::as_str), Some("5"));
        assert!(event.message.contains("Connection refused"));
    }

    #[test]
    fn parses_modsecurity_alert_embedded_in_apache_line() {
        let line = r#"[Wed Oct 11 14:32:52.123456 2023] [security2:error] [pid 1234] [client 198.51.100.4:4321] ModSecurity: Warning. Matched "Operator `Rx' ..." [id "942100"] [msg "SQL Injection Attack Detected"] [severity "CRITICAL"] [uri "/login"]"#;
        let event = parse_line(line, 3).unwrap();
        assert_eq!(event.error_type, "modsecurity");
        assert_eq!(event.message, "SQL Injection Attack Detected");
        assert_eq!(event.request_url.as_deref(), Some("/login"));
        assert_eq!(event.ip.as_deref(), Some("198.51.100.4"));
        assert_eq!(event.context.get("rule_id").map(String::as_str), Some("942100"));
        assert_eq!(event.context.get("severity").map(String::as_str), Some("critical"));
    }

    #[test]
    fn rejects_unrecognized_line() {
        assert!(parse_line("totally unrelated text", 4).is_none());
    }
}
