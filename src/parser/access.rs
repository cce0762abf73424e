//! Nginx and Apache combined-log-format recognizers (§4.2).
//!
//! Both formats share the same field layout; they differ only in how the
//! referer/user-agent quoting and dash-for-empty conventions are applied in
//! practice, so a single regex handles both.

use crate::models::{LogFormat, NormalizedEvent};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

// host ident user [timestamp] "request" status bytes "referer" "user-agent"
static COMBINED_LOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^
        (?P<host>\S+)\s+
        \S+\s+                                   # identity, unused
        (?P<user>\S+)\s+
        \[(?P<timestamp>[^\]]+)\]\s+
        "(?P<request>[^"]*)"\s+
        (?P<status>\d{3})\s+
        (?P<size>\d+|-)
        (?:\s+"(?P<referer>[^"]*)"\s+"(?P<agent>[^"]*)")?
        \s*$
        "#,
    )
    .expect("failed compiling combined access-log regex")
});

/// Split the quoted request line into `(method, path, protocol)`. When it
/// doesn't split into exactly three whitespace-separated tokens, `method`
/// and `protocol` are empty and `path` is the raw request text (§4.2).
fn split_request(request: &str) -> (String, String, String) {
    let mut parts = request.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(protocol), None) => {
            (method.to_string(), path.to_string(), protocol.to_string())
        }
        _ => (String::new(), request.to_string(), String::new()),
    }
}

const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn dash_as_none(s: &str) -> Option<String> {
    if s.is_empty() || s == "-" {
        None
    } else {
        Some(s.to_string())
    }
}

/// Try to parse one line against the format nominated for the site. `Auto`
/// tries nginx first, then apache — in practice the same regex serves both,
/// so this just runs the single recognizer regardless of the variant asked
/// for.
pub fn parse_line(line: &str, line_number: u64, _format: LogFormat) -> Option<NormalizedEvent> {
    let caps = COMBINED_LOG.captures(line)?;

    let timestamp = parse_timestamp(&caps["timestamp"])?;
    let status: u16 = caps["status"].parse().ok()?;
    let bytes_sent: u64 = match &caps["size"] {
        "-" => 0,
        digits => digits.parse().ok()?,
    };
    let (method, path, protocol) = split_request(&caps["request"]);

    Some(NormalizedEvent {
        timestamp,
        ip: caps["host"].to_string(),
        method,
        path,
        status,
        bytes_sent,
        referer: caps.name("referer").and_then(|m| dash_as_none(m.as_str())),
        user_agent: caps.name("agent").and_then(|m| dash_as_none(m.as_str())),
        user: dash_as_none(&caps["user"]),
        protocol,
        line_number,
        raw: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combined_line_with_referer_and_agent() {
        let line = r#"198.51.100.7 - alice [23/Jan/2026:09:12:00 -0500] "POST /login HTTP/1.1" 401 128 "https://example.com/" "curl/8.4.0""#;
        let event = parse_line(line, 1, LogFormat::Auto).unwrap();
        assert_eq!(event.ip, "198.51.100.7");
        assert_eq!(event.user.as_deref(), Some("alice"));
        assert_eq!(event.method, "POST");
        assert_eq!(event.path, "/login");
        assert_eq!(event.status, 401);
        assert_eq!(event.bytes_sent, 128);
        assert_eq!(event.referer.as_deref(), Some("https://example.com/"));
        assert_eq!(event.user_agent.as_deref(), Some("curl/8.4.0"));
        assert_eq!(event.timestamp.to_rfc3339(), "2026-01-23T14:12:00+00:00");
    }

    #[test]
    fn parses_line_missing_referer_and_agent() {
        let line = r#"10.0.0.5 - - [01/Feb/2026:00:00:00 +0000] "GET / HTTP/1.1" 200 512"#;
        let event = parse_line(line, 2, LogFormat::Auto).unwrap();
        assert_eq!(event.referer, None);
        assert_eq!(event.user_agent, None);
        assert_eq!(event.user, None);
    }

    #[test]
    fn dash_size_becomes_zero_bytes() {
        let line = r#"10.0.0.5 - - [01/Feb/2026:00:00:00 +0000] "GET / HTTP/1.1" 304 -"#;
        let event = parse_line(line, 3, LogFormat::Auto).unwrap();
        assert_eq!(event.bytes_sent, 0);
    }

    #[test]
    fn rejects_unparseable_line() {
        assert!(parse_line("not a log line at all", 4, LogFormat::Auto).is_none());
    }

    #[test]
    fn malformed_request_line_falls_back_to_raw_path() {
        let line = r#"10.0.0.5 - - [01/Feb/2026:00:00:00 +0000] "GET" 400 0"#;
        let event = parse_line(line, 5, LogFormat::Auto).unwrap();
        assert_eq!(event.method, "");
        assert_eq!(event.protocol, "");
        assert_eq!(event.path, "GET");
    }
}
