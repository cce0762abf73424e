//! Regex-based extraction of access-log and error-log fields into
//! normalized events (§4.2).
//!
//! The parser's public contract is pure over the input line sequence: it
//! never performs I/O and never blocks. Per-line failures are counted in
//! [`ParseQuality`], not raised.

pub mod access;
pub mod error_log;

use crate::decoder::Line;
use crate::models::{LogFormat, NormalizedEvent, ParseQuality};
use crate::models::event::RawErrorEvent;

/// Parse a sequence of decoded lines as access-log events for `format`.
///
/// When `format` is [`LogFormat::Auto`], each line is tried against the
/// recognizers in a fixed order (nginx, then apache); the first to match
/// claims the line.
pub fn parse_access_lines(lines: &[Line], format: LogFormat) -> (Vec<NormalizedEvent>, ParseQuality) {
    let mut events = Vec::with_capacity(lines.len());
    let mut quality = ParseQuality { total_lines: lines.len() as u64, ..Default::default() };

    for line in lines {
        match access::parse_line(&line.text, line.number, format) {
            Some(event) => {
                quality.parsed_lines += 1;
                events.push(event);
            }
            None => quality.failed_lines += 1,
        }
    }

    (events, quality)
}

/// Parse a sequence of decoded lines as error-log occurrences.
pub fn parse_error_lines(lines: &[Line]) -> (Vec<RawErrorEvent>, ParseQuality) {
    let mut events = Vec::with_capacity(lines.len());
    let mut quality = ParseQuality { total_lines: lines.len() as u64, ..Default::default() };

    for line in lines {
        match error_log::parse_line(&line.text, line.number) {
            Some(event) => {
                quality.parsed_lines += 1;
                events.push(event);
            }
            None => quality.failed_lines += 1,
        }
    }

    (events, quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;

    #[test]
    fn s1_nginx_combined_single_line() {
        let input = "203.0.113.42 - - [23/Jan/2026:17:36:10 +0000] \"GET /api/health HTTP/1.1\" 200 532 \"-\" \"Mozilla/5.0\"\n";
        let (lines, _) = decode("access.log", input.as_bytes()).unwrap();
        let (events, quality) = parse_access_lines(&lines, LogFormat::Auto);
        assert_eq!(quality.parsed_lines, 1);
        assert_eq!(quality.failed_lines, 0);
        let event = &events[0];
        assert_eq!(event.ip, "203.0.113.42");
        assert_eq!(event.method, "GET");
        assert_eq!(event.path, "/api/health");
        assert_eq!(event.status, 200);
        assert_eq!(event.bytes_sent, 532);
        assert_eq!(event.referer, None);
        assert_eq!(event.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(event.user, None);
        assert_eq!(event.protocol, "HTTP/1.1");
        assert_eq!(
            event.timestamp.to_rfc3339(),
            "2026-01-23T17:36:10+00:00"
        );
    }
}
