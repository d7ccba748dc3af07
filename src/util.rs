use std::{borrow::Cow, io::Read};

use chrono::{DateTime, NaiveDate, Utc};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};

use crate::LoadError;

/// Upper bound on an inflated data file (key registry, revocation list).
#[cfg_attr(not(feature = "json"), allow(dead_code))]
pub(crate) const MAX_DATA_FILE: usize = 64 * 1024 * 1024;

pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Data files are shipped either plain or gzip-compressed.
#[cfg_attr(not(feature = "json"), allow(dead_code))]
pub(crate) fn gunzip_if_compressed(bytes: &[u8]) -> Result<Cow<'_, [u8]>, LoadError> {
    gunzip_bounded(bytes, MAX_DATA_FILE)
}

#[cfg_attr(not(feature = "json"), allow(dead_code))]
fn gunzip_bounded(bytes: &[u8], limit: usize) -> Result<Cow<'_, [u8]>, LoadError> {
    if !bytes.starts_with(&[0x1f, 0x8b]) {
        return Ok(Cow::Borrowed(bytes));
    }
    read_bounded(GzDecoder::new(bytes), limit)
        .map(Cow::Owned)
        .map_err(LoadError::Decompression)
}

/// Reads `reader` to the end, failing once more than `limit` bytes come out.
pub(crate) fn read_bounded(reader: impl Read, limit: usize) -> Result<Vec<u8>, String> {
    let mut output = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|e| e.to_string())?;
    if output.len() > limit {
        return Err(format!("inflated data exceeds {limit} bytes"));
    }
    Ok(output)
}

/// Renders a date of birth. HCERT allows `YYYY-MM-DD`, `YYYY-MM`, `YYYY`
/// or an empty string.
/// ```text
/// "1964-08-12" -> "Aug 12, 1964"
/// "1964-08"    -> "Aug, 1964"
/// "1964"       -> "1964"
/// ```
pub(crate) fn format_birth_date(value: &str) -> String {
    match value.matches('-').count() {
        0 => value.to_string(),
        1 => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
            .map(|d| d.format("%b, %Y").to_string())
            .unwrap_or_default(),
        _ => format_day(value),
    }
}

/// `"2021-05-01"` -> `"May 1, 2021"`, empty when unparseable.
pub(crate) fn format_day(value: &str) -> String {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.format("%b %-d, %Y").to_string())
        .unwrap_or_default()
}

/// RFC 3339 timestamp rendered in UTC, empty when unparseable.
pub(crate) fn format_instant(value: &str) -> String {
    DateTime::parse_from_rfc3339(value)
        .map(|t| {
            t.with_timezone(&Utc)
                .format("%b %-d, %Y - %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}
