// =============================================================================
// Canonical Clock — one UTC epoch-seconds axis for every source encoding
// =============================================================================
//
// Source artifacts encode bar-open times as integer seconds, integer
// milliseconds, fractional epoch values, or calendar text in a declared
// timezone. Everything downstream (bar table, trade alignment, range
// queries) works on a single canonical representation: UTC epoch seconds.
//
// The seconds/milliseconds decision is magnitude-based and applied
// identically to every row of a dataset: it is a fixed policy, never a
// per-row guess.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::engine::error::EngineError;

/// Integer timestamps at or above this magnitude are interpreted as
/// milliseconds since the Unix epoch; below it, as seconds. In seconds this
/// threshold lies beyond year 5000, in milliseconds it is early 1973, so no
/// real bar data falls in the ambiguous band.
pub const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Calendar text layouts accepted for bar and trade timestamps, tried in
/// order after RFC 3339.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// One source timestamp value before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// Integer epoch value, seconds or milliseconds.
    Numeric(i64),
    /// Calendar text, interpreted in the declared source timezone unless it
    /// carries its own offset.
    Text(String),
}

impl RawTimestamp {
    /// Classify one raw field. Digit strings (including fractional epoch
    /// values some exporters write, e.g. `1729771800.0`) become numeric;
    /// everything else is calendar text.
    pub fn from_field(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return Self::Numeric(v);
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            if v.is_finite() {
                return Self::Numeric(v.round() as i64);
            }
        }
        Self::Text(trimmed.to_string())
    }
}

/// Normalize one source timestamp to UTC epoch seconds (bar-open
/// convention).
///
/// Already-canonical epoch-seconds input is returned unchanged, so the
/// function is idempotent over its own output.
pub fn canonical_time(raw: &RawTimestamp, source_tz: Tz) -> Result<i64, EngineError> {
    match raw {
        RawTimestamp::Numeric(v) => Ok(normalize_epoch(*v)),
        RawTimestamp::Text(text) => parse_calendar(text, source_tz),
    }
}

/// Collapse an integer epoch value of unknown resolution to seconds.
fn normalize_epoch(value: i64) -> i64 {
    if value.abs() >= MILLIS_THRESHOLD {
        value.div_euclid(1000)
    } else {
        value
    }
}

/// Parse calendar text. An explicit offset (RFC 3339) wins; otherwise the
/// naive value is anchored in the declared source timezone.
fn parse_calendar(text: &str, source_tz: Tz) -> Result<i64, EngineError> {
    if text.is_empty() {
        return Err(malformed(text, "empty timestamp field"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp());
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return anchor(naive, source_tz, text);
        }
    }

    // Bare dates mean midnight at the start of that day.
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return anchor(naive, source_tz, text);
        }
    }

    Err(malformed(text, "no supported encoding matched"))
}

/// Resolve a naive local datetime in `tz`. DST gaps and folds pick the
/// earliest valid instant; a fully invalid local time is malformed input.
fn anchor(naive: NaiveDateTime, tz: Tz, original: &str) -> Result<i64, EngineError> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| malformed(original, "local time does not exist in source timezone"))
}

fn malformed(value: &str, reason: &str) -> EngineError {
    EngineError::MalformedTimestamp {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
