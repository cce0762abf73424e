//! Error grouper (§4.7): canonicalizes and fingerprints error occurrences so
//! repeated instances of "the same" error collapse into one [`ErrorGroup`].

use crate::models::event::RawErrorEvent;
use crate::models::{ErrorGroup, ErrorOccurrence};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static QUOTED_STRING: Lazy<Regex> = Lazy::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).unwrap());
static TIMESTAMP_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?").unwrap()
});
static ABSOLUTE_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(/[\w.\-]+)+/(?P<base>[\w.\-]+)").unwrap());

/// Canonicalize an error message so textually-distinct-but-semantically-the-
/// same occurrences collapse to the same fingerprint (§4.7 step 1).
pub fn canonicalize_message(message: &str) -> String {
    let lowered = message.to_ascii_lowercase();
    let no_timestamps = TIMESTAMP_LIKE.replace_all(&lowered, "N");
    let no_paths = ABSOLUTE_PATH.replace_all(&no_timestamps, "$base");
    let no_quotes = QUOTED_STRING.replace_all(&no_paths, "\"S\"");
    DIGITS.replace_all(&no_quotes, "N").into_owned()
}

fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// SHA-256 fingerprint truncated to 16 bytes over `(error_type,
/// canonical_message, file_basename, function_name)`, nulls as empty
/// (§4.7 step 2).
pub fn fingerprint(error_type: &str, canonical_message: &str, file_path: Option<&str>, function_name: Option<&str>) -> String {
    let file_basename = file_path.map(basename).unwrap_or_default();
    let function_name = function_name.unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(error_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_message.as_bytes());
    hasher.update(b"\0");
    hasher.update(file_basename.as_bytes());
    hasher.update(b"\0");
    hasher.update(function_name.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
}

/// The outcome of grouping one occurrence: the group to upsert (already
/// folded with this occurrence) and the occurrence row to persist.
pub struct GroupedError {
    pub fingerprint: String,
    pub error_type: String,
    /// The canonicalized message (§4.7 step 1) — this, not the raw
    /// occurrence message, is what `ErrorGroup::error_message` stores (§3).
    pub canonical_message: String,
    pub occurrence: ErrorOccurrence,
}

/// Fold one raw error event into its canonical fingerprint and a ready-to-
/// persist occurrence row. Upserting the [`ErrorGroup`] itself is the
/// caller's job (see [`crate::dal::traits::ErrorGroupStore`]), since it
/// requires an atomic read-modify-write against storage (§4.7 step 3).
pub fn group(_site_id: &str, log_file_id: &str, raw: &RawErrorEvent) -> GroupedError {
    let canonical_message = canonicalize_message(&raw.message);
    let fp = fingerprint(&raw.error_type, &canonical_message, raw.file_path.as_deref(), raw.function_name.as_deref());

    let occurrence = ErrorOccurrence {
        id: Uuid::new_v4().to_string(),
        group_fingerprint: fp.clone(),
        log_file_id: log_file_id.to_string(),
        timestamp: raw.timestamp,
        message: raw.message.clone(),
        stack_trace: raw.stack_trace.clone(),
        file_path: raw.file_path.clone(),
        file_line: raw.file_line,
        function_name: raw.function_name.clone(),
        request_url: raw.request_url.clone(),
        request_method: raw.request_method.clone(),
        ip: raw.ip.clone(),
        user_agent: raw.user_agent.clone(),
        context: raw.context.clone(),
    };

    GroupedError { fingerprint: fp, error_type: raw.error_type.clone(), canonical_message, occurrence }
}

/// Apply one occurrence's timestamp to an existing or freshly-created group
/// (§4.7 step 3).
pub fn upsert_group(existing: Option<ErrorGroup>, site_id: &str, fingerprint: &str, error_type: &str, message: &str, at: chrono::DateTime<chrono::Utc>) -> ErrorGroup {
    let mut group = existing.unwrap_or_else(|| {
        ErrorGroup::new(site_id.to_string(), fingerprint.to_string(), error_type.to_string(), message.to_string(), at)
    });
    group.record_occurrence(at);
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn raw(message: &str, file_path: Option<&str>) -> RawErrorEvent {
        RawErrorEvent {
            timestamp: Utc::now(),
            error_type: "error".to_string(),
            message: message.to_string(),
            stack_trace: None,
            file_path: file_path.map(str::to_string),
            file_line: None,
            function_name: None,
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
    fn canonicalizes_digits_and_quoted_strings() {
        let canon = canonicalize_message(r#"User '12345' not found after 3 retries"#);
        assert_eq!(canon, r#"user "S" not found after N retries"#);
    }

    #[test]
    fn canonicalizes_absolute_paths_to_basename() {
        let canon = canonicalize_message("failed to open /var/www/html/config.php");
        assert_eq!(canon, "failed to open config.php");
    }

    #[test]
    fn same_shape_errors_with_different_ids_share_a_fingerprint() {
        let a = group("site1", "f1", &raw("User '111' timed out", Some("/app/worker.rs")));
        let b = group("site1", "f1", &raw("User '222' timed out", Some("/app/worker.rs")));
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn different_error_types_get_different_fingerprints() {
        let same_message = raw("disk full", None);
        let mut other = raw("disk full", None);
        other.error_type = "warn".to_string();
        let a = group("site1", "f1", &same_message);
        let b = group("site1", "f1", &other);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn upsert_folds_first_and_last_seen_and_count() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(60);
        let group0 = upsert_group(None, "site1", "fp1", "error", "disk full", t0);
        assert_eq!(group0.occurrence_count, 1);
        let group1 = upsert_group(Some(group0), "site1", "fp1", "error", "disk full", t1);
        assert_eq!(group1.occurrence_count, 2);
        assert_eq!(group1.first_seen, t0);
        assert_eq!(group1.last_seen, t1);
    }
}
