//! Curated pattern lists for the rule engine (§4.5, SPEC_FULL.md B — these
//! are fixed constants, not per-tenant configuration).

use once_cell::sync::Lazy;
use regex::Regex;

/// Path prefixes probed by scanners looking for admin panels or leaked
/// config/VCS files.
pub const ADMIN_PATHS: &[&str] = &[
    "/wp-admin",
    "/wp-login.php",
    "/phpmyadmin",
    "/pma",
    "/.env",
    "/.git/",
    "/.git/config",
    "/admin",
    "/administrator",
    "/manager/html",
    "/.aws/credentials",
];

pub fn matches_admin_path(path: &str) -> Option<&'static str> {
    ADMIN_PATHS.iter().find(|p| path.starts_with(**p)).copied()
}

/// Paths treated as sensitive-file exposures on a 2xx response.
pub const SENSITIVE_FILE_PATTERNS: &[&str] = &[
    "/.env",
    "/.git/config",
    "/id_rsa",
    "/wp-config.php",
    "/config.php.bak",
    "/.ssh/",
    "/backup.sql",
    "/.htpasswd",
];

pub fn matches_sensitive_file(path: &str) -> Option<&'static str> {
    SENSITIVE_FILE_PATTERNS.iter().find(|p| path.contains(**p)).copied()
}

/// Path substrings treated as authentication endpoints for the brute-force
/// rule.
pub const AUTH_PATH_HINTS: &[&str] = &["login", "signin", "sign-in", "auth", "wp-login"];

pub fn looks_like_auth_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    AUTH_PATH_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Known-bad user agents (scanners, vuln fuzzers).
pub const SUSPICIOUS_USER_AGENTS: &[&str] =
    &["sqlmap", "nikto", "masscan", "nmap", "nessus", "acunetix", "zgrab", "dirbuster"];

pub fn matches_suspicious_ua(ua: &str) -> Option<&'static str> {
    let lower = ua.to_ascii_lowercase();
    SUSPICIOUS_USER_AGENTS.iter().find(|bad| lower.contains(**bad)).copied()
}

/// One SQLi/XSS signature family: a name and the compiled regex that
/// detects it in the decoded path+query.
pub struct Signature {
    pub family: &'static str,
    pub regex: &'static Lazy<Regex>,
}

static SQLI_UNION_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bunion\b.{0,40}\bselect\b|\bselect\b.{0,40}\bfrom\b").unwrap());
static SQLI_BOOLEAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)'\s*or\s+'?1'?\s*=\s*'?1|--\s*$").unwrap());
static SQLI_SLEEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)sleep\s*\(\s*\d+\s*\)|benchmark\s*\(").unwrap());
static XSS_SCRIPT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<script[\s>]|%3cscript").unwrap());
static XSS_EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)onerror\s*=|onload\s*=").unwrap());

pub fn signatures() -> &'static [Signature] {
    static SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
        vec![
            Signature { family: "sqli.union_select", regex: &SQLI_UNION_SELECT },
            Signature { family: "sqli.boolean", regex: &SQLI_BOOLEAN },
            Signature { family: "sqli.sleep", regex: &SQLI_SLEEP },
            Signature { family: "xss.script_tag", regex: &XSS_SCRIPT_TAG },
            Signature { family: "xss.event_handler", regex: &XSS_EVENT_HANDLER },
        ]
    });
    &SIGNATURES
}

pub fn matches_signature(decoded_path_and_query: &str) -> Option<&'static str> {
    signatures()
        .iter()
        .find(|sig| sig.regex.is_match(decoded_path_and_query))
        .map(|sig| sig.family)
}

/// True if `path` contains a `..` segment after percent-decoding (§4.5
/// "Directory traversal").
pub fn contains_traversal(path: &str) -> bool {
    let decoded = percent_decode(path);
    decoded.split('/').any(|segment| segment == "..")
}

/// Minimal percent-decoder: enough to catch `%2e%2e` and similar without
/// pulling in a full URL-parsing crate for a single defensive check.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_admin_paths() {
        assert_eq!(matches_admin_path("/wp-admin/install.php"), Some("/wp-admin"));
        assert_eq!(matches_admin_path("/index.html"), None);
    }

    #[test]
    fn detects_sqli_union_select() {
        assert_eq!(matches_signature("id=1 UNION SELECT password FROM users"), Some("sqli.union_select"));
    }

    #[test]
    fn detects_xss_script_tag() {
        assert_eq!(matches_signature("q=<script>alert(1)</script>"), Some("xss.script_tag"));
    }

    #[test]
    fn detects_percent_encoded_traversal() {
        assert!(contains_traversal("/files/%2e%2e/%2e%2e/etc/passwd"));
        assert!(!contains_traversal("/files/report.pdf"));
    }

    #[test]
    fn detects_plain_traversal() {
        assert!(contains_traversal("/static/../../etc/passwd"));
    }
}
