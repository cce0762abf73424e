//! Stream decoding of blob bytes into lines (§4.1).
//!
//! Transparently gzip-decompresses when the filename ends in `.gz` or the
//! magic bytes match, regardless of the extension. Empty lines and `#`
//! comments are skipped but counted; the line iterator itself never fails
//! on content, only on an unreadable compression stream.

use crate::error::{PipelineError, Result};
use flate2::read::MultiGzDecoder;
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Running counters produced alongside the line sequence (§4.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeCounters {
    pub total_lines: u64,
    pub empty_lines: u64,
}

/// One decoded line, 1-indexed from the start of the (decompressed) file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: u64,
    pub text: String,
}

fn looks_gzipped(filename: &str, bytes: &[u8]) -> bool {
    filename.ends_with(".gz") || bytes.starts_with(&GZIP_MAGIC)
}

/// Decompress (if needed) and decode `bytes` as UTF-8 (lossily, since log
/// files routinely carry non-UTF-8 bytes in request paths or user agents).
fn decode_text(filename: &str, bytes: &[u8]) -> Result<String> {
    if looks_gzipped(filename, bytes) {
        let mut decoder = MultiGzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| PipelineError::decode(format!("gzip decompression failed: {e}")))?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Decode `bytes` for `filename` into an ordered sequence of lines plus
/// running quality counters. CRLF and LF line endings are both accepted;
/// line numbers count logical lines, starting at 1.
pub fn decode(filename: &str, bytes: &[u8]) -> Result<(Vec<Line>, DecodeCounters)> {
    let text = decode_text(filename, bytes)?;
    let mut lines = Vec::new();
    let mut counters = DecodeCounters::default();

    // `str::lines()` splits on both "\n" and "\r\n" and never yields a
    // trailing empty element for a file ending in a newline.
    for raw_line in text.lines() {
        counters.total_lines += 1;
        let number = counters.total_lines;
        if raw_line.is_empty() || raw_line.starts_with('#') {
            counters.empty_lines += 1;
            continue;
        }
        lines.push(Line { number, text: raw_line.to_string() });
    }

    Ok((lines, counters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_text_counts_and_skips() {
        let input = "line one\n\n# a comment\nline two\n";
        let (lines, counters) = decode("access.log", input.as_bytes()).unwrap();
        assert_eq!(counters.total_lines, 4);
        assert_eq!(counters.empty_lines, 2);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], Line { number: 1, text: "line one".into() });
        assert_eq!(lines[1], Line { number: 4, text: "line two".into() });
    }

    #[test]
    fn crlf_is_tolerated() {
        let input = "one\r\ntwo\r\n";
        let (lines, counters) = decode("access.log", input.as_bytes()).unwrap();
        assert_eq!(counters.total_lines, 2);
        assert_eq!(lines[0].text, "one");
        assert_eq!(lines[1].text, "two");
    }

    #[test]
    fn gzip_by_extension_and_magic_bytes() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"a\nb\n").unwrap();
        let gz_bytes = encoder.finish().unwrap();

        let (lines, _) = decode("access.log.gz", &gz_bytes).unwrap();
        assert_eq!(lines.len(), 2);

        // no .gz suffix, but magic bytes should still be detected
        let (lines, _) = decode("access.log", &gz_bytes).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn bad_gzip_stream_fails() {
        let err = decode("bad.gz", b"not really gzip").unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }
}
