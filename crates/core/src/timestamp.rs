//! Sortable generation stamps for output file names.
//!
//! Stamps are fixed-width UTC times with microsecond resolution, e.g.
//! `20250114T093005.123456Z`, so lexicographic order equals chronological
//! order. Stamps handed out by one process are strictly increasing even when
//! the wall clock does not advance between two calls.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use std::sync::Mutex;

/// `chrono` format string for generation stamps.
pub const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Length in bytes of a formatted stamp.
pub const STAMP_LEN: usize = 23;

static LAST_ISSUED_MICROS: Lazy<Mutex<i64>> = Lazy::new(|| Mutex::new(i64::MIN));

/// Issue the next generation time.
pub fn next_generation() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_ISSUED_MICROS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let micros = if now > *last { now } else { *last + 1 };
    *last = micros;
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Issue the next generation stamp as a string.
pub fn generation_stamp() -> String {
    format_stamp(&next_generation())
}

/// Format `time` as a generation stamp.
pub fn format_stamp(time: &DateTime<Utc>) -> String {
    time.format(STAMP_FORMAT).to_string()
}

/// Parse a generation stamp back into a time.
pub fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
