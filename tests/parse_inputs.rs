//! End-to-end decode → parse coverage for §8 scenario S1 and the
//! error-log variants, exercised through the public crate API rather than
//! the parser's own unit tests.

use logamizer::decoder::decode;
use logamizer::models::LogFormat;
use logamizer::parser::{parse_access_lines, parse_error_lines};

#[test]
fn nginx_combined_access_log_parses_cleanly() {
    let input = concat!(
        "203.0.113.42 - - [23/Jan/2026:17:36:10 +0000] \"GET /api/health HTTP/1.1\" 200 532 \"-\" \"Mozilla/5.0\"\n",
        "198.51.100.7 - alice [23/Jan/2026:17:36:11 +0000] \"POST /login HTTP/1.1\" 401 128 \"https://example.com/\" \"curl/8.4.0\"\n",
        "\n",
        "# a comment line the decoder should skip\n",
    );
    let (lines, counters) = decode("access.log", input.as_bytes()).unwrap();
    assert_eq!(counters.total_lines, 4);
    assert_eq!(counters.empty_lines, 2);

    let (events, quality) = parse_access_lines(&lines, LogFormat::Auto);
    assert_eq!(events.len(), 2);
    assert_eq!(quality.parsed_lines, 2);
    assert_eq!(quality.failed_lines, 0);
    assert_eq!(events[1].user.as_deref(), Some("alice"));
}

#[test]
fn gzip_compressed_access_log_round_trips_through_decode_and_parse() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let body = b"10.0.0.9 - - [01/Mar/2026:00:00:00 +0000] \"GET /ping HTTP/1.1\" 200 3 \"-\" \"-\"\n";
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    let gz_bytes = encoder.finish().unwrap();

    let (lines, _) = decode("access.log.gz", &gz_bytes).unwrap();
    let (events, quality) = parse_access_lines(&lines, LogFormat::Auto);
    assert_eq!(quality.parsed_lines, 1);
    assert_eq!(events[0].ip, "10.0.0.9");
}

#[test]
fn mixed_quality_access_log_counts_failures_without_aborting() {
    let input = concat!(
        "10.0.0.1 - - [23/Jan/2026:10:00:00 +0000] \"GET / HTTP/1.1\" 200 100 \"-\" \"-\"\n",
        "this line is not a combined-log line at all\n",
        "10.0.0.2 - - [23/Jan/2026:10:00:01 +0000] \"GET /x HTTP/1.1\" 404 0 \"-\" \"-\"\n",
    );
    let (lines, _) = decode("access.log", input.as_bytes()).unwrap();
    let (events, quality) = parse_access_lines(&lines, LogFormat::Auto);
    assert_eq!(events.len(), 2);
    assert_eq!(quality.parsed_lines, 2);
    assert_eq!(quality.failed_lines, 1);
    assert!((quality.success_rate() - (2.0 / 3.0)).abs() < 1e-9);
}

#[test]
fn apache_nginx_and_modsecurity_error_lines_all_parse() {
    let input = concat!(
        "[Wed Oct 11 14:32:52.123456 2023] [core:error] [pid 1234:tid 5678] [client 203.0.113.9:5555] File does not exist: /var/www/html/favicon.ico\n",
        "2026/01/23 09:12:00 [error] 1234#0: *5 connect() failed (111: Connection refused) while connecting to upstream\n",
        r#"[Wed Oct 11 14:32:52.123456 2023] [security2:error] [pid 1234] [client 198.51.100.4:4321] ModSecurity: Warning. Matched "Operator `Rx' ..." [id "942100"] [msg "SQL Injection Attack Detected"] [severity "CRITICAL"] [uri "/login"]"#,
        "\n",
    );
    let (lines, _) = decode("error.log", input.as_bytes()).unwrap();
    let (events, quality) = parse_error_lines(&lines);
    assert_eq!(events.len(), 3);
    assert_eq!(quality.failed_lines, 0);
    assert_eq!(events[2].error_type, "modsecurity");
}
