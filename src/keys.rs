//! The object-key naming grammar for backup artifacts.
//!
//! A backup's object key is the only durable record of which database it
//! belongs to and when it was taken — there is no manifest or index:
//!
//! ```text
//! {prefix}/{version_tag}/{database}_{YYYY-MM-DDThh:mm:ssZ}.sql.gz[.enc]
//! ```
//!
//! [`parse`] must recover the original database name even when the name
//! itself contains underscores or digit runs, so the split is anchored at the
//! rightmost timestamp-shaped tail of the file name, never at the first
//! underscore. Earlier deployments wrote the colon-free spelling
//! `YYYY-MM-DDThhmmssZ`; the parser accepts both, [`compose`] always writes
//! the colon form.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Suffix of every dump artifact.
pub const DUMP_SUFFIX: &str = ".sql.gz";

/// Extra suffix carried by encrypted artifacts.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

const TIMESTAMP_EXTENDED: &str = "%Y-%m-%dT%H:%M:%SZ";
const TIMESTAMP_BASIC: &str = "%Y-%m-%dT%H%M%SZ";

/// Length of `YYYY-MM-DDThh:mm:ssZ`.
const TIMESTAMP_EXTENDED_LEN: usize = 20;
/// Length of `YYYY-MM-DDThhmmssZ`.
const TIMESTAMP_BASIC_LEN: usize = 18;

/// Database name and creation instant recovered from an object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub database: String,
    pub timestamp: DateTime<Utc>,
    pub encrypted: bool,
}

/// Render a backup timestamp: UTC, second precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_EXTENDED).to_string()
}

/// Compose the object key for one dump artifact.
///
/// Empty path segments are skipped, so an explicitly empty prefix yields
/// `{version_tag}/{database}_...` rather than a leading slash.
pub fn compose(
    prefix: &str,
    version_tag: &str,
    database: &str,
    at: DateTime<Utc>,
    encrypted: bool,
) -> String {
    let mut key = String::new();
    for segment in [prefix, version_tag] {
        if !segment.is_empty() {
            key.push_str(segment);
            key.push('/');
        }
    }
    key.push_str(database);
    key.push('_');
    key.push_str(&format_timestamp(at));
    key.push_str(DUMP_SUFFIX);
    if encrypted {
        key.push_str(ENCRYPTED_SUFFIX);
    }
    key
}

/// Recover `(database, timestamp, encrypted)` from an object key.
///
/// Returns `None` for keys outside the naming grammar; callers must treat
/// those as foreign objects and never delete them.
pub fn parse(key: &str) -> Option<ParsedKey> {
    let file_name = key.rsplit('/').next().unwrap_or(key);

    let (stem, encrypted) = match file_name.strip_suffix(ENCRYPTED_SUFFIX) {
        Some(rest) => (rest, true),
        None => (file_name, false),
    };
    let stem = stem.strip_suffix(DUMP_SUFFIX)?;

    split_timestamp_tail(stem, TIMESTAMP_EXTENDED_LEN, TIMESTAMP_EXTENDED)
        .or_else(|| split_timestamp_tail(stem, TIMESTAMP_BASIC_LEN, TIMESTAMP_BASIC))
        .map(|(database, timestamp)| ParsedKey {
            database,
            timestamp,
            encrypted,
        })
}

/// Split `stem` into a database name and a timestamp of exactly `tail_len`
/// bytes, separated by `_`. Matching a fixed-length tail is what anchors the
/// split at the rightmost timestamp-shaped run.
fn split_timestamp_tail(
    stem: &str,
    tail_len: usize,
    format: &str,
) -> Option<(String, DateTime<Utc>)> {
    if stem.len() <= tail_len {
        return None;
    }
    let split_at = stem.len() - tail_len;
    // Timestamps are pure ASCII; a non-boundary here means the tail is not one.
    if !stem.is_char_boundary(split_at) {
        return None;
    }
    let (head, tail) = stem.split_at(split_at);
    let database = head.strip_suffix('_')?;
    if database.is_empty() {
        return None;
    }
    let timestamp = NaiveDateTime::parse_from_str(tail, format).ok()?;
    Some((database.to_string(), timestamp.and_utc()))
}
