//! Validated closure records and the feed parse step.
//!
//! The upstream feed is a JSON array of loosely-shaped objects. All field
//! checking happens here, in a single classification step: each raw item
//! becomes either a [`ClosureRecord`] or a [`MalformedRecord`] reason.
//! Downstream code (identity derivation, reconciliation, formatting) only
//! ever sees validated records and never re-checks for missing fields.
//!
//! # Wire Shape
//!
//! ```text
//! {
//!   "status": "Closure Scheduled",
//!   "type": "Primary Date",
//!   "date": "May 12, 2025",
//!   "time": "10:00 a.m. to 4:00 p.m.",
//!   "timestamps": { "start": 1747065600, "end": 1747087200 },
//!   "notes": "optional free text"
//! }
//! ```
//!
//! `status`, `type`, and both timestamps are required; `date`, `time`, and
//! `notes` are display-only and optional. `status` is an open vocabulary;
//! unknown values are carried through verbatim and degrade gracefully at
//! presentation time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Reasons a raw feed item fails validation.
///
/// Malformed items are skipped with a log line; they never fail the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    /// The `status` field is missing or not a string.
    #[error("missing status")]
    MissingStatus,

    /// The `type` field is missing or not a string.
    #[error("missing type")]
    MissingKind,

    /// The `timestamps` object is missing entirely.
    #[error("missing timestamps")]
    MissingTimestamps,

    /// A start or end timestamp is missing or not an integer.
    #[error("invalid {field} timestamp")]
    InvalidTimestamp { field: &'static str },

    /// The item itself is not a JSON object.
    #[error("item is not an object")]
    NotAnObject,
}

/// The authoritative time window of a closure, in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        TimeWindow { start, end }
    }

    /// Whether the window's end has passed at `now` (Unix seconds).
    pub fn ended_by(&self, now: i64) -> bool {
        self.end <= now
    }
}

/// A validated closure event from the upstream feed.
///
/// `status` and `kind` carry the upstream vocabulary verbatim. The `date`
/// and `time` strings are human-readable and not authoritative; `window`
/// holds the authoritative Unix-second range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureRecord {
    pub status: String,

    /// The upstream `type` field (e.g. "Primary Date", "Backup Date").
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(rename = "timestamps")]
    pub window: TimeWindow,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ClosureRecord {
    /// Validates a single raw feed item.
    ///
    /// Timestamps are accepted as JSON integers or as strings of digits;
    /// the upstream feed has produced both over time.
    pub fn from_raw(raw: &Value) -> Result<ClosureRecord, MalformedRecord> {
        let obj = raw.as_object().ok_or(MalformedRecord::NotAnObject)?;

        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .ok_or(MalformedRecord::MissingStatus)?
            .to_string();

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MalformedRecord::MissingKind)?
            .to_string();

        let timestamps = obj
            .get("timestamps")
            .and_then(Value::as_object)
            .ok_or(MalformedRecord::MissingTimestamps)?;

        let start = coerce_timestamp(timestamps.get("start"))
            .ok_or(MalformedRecord::InvalidTimestamp { field: "start" })?;
        let end = coerce_timestamp(timestamps.get("end"))
            .ok_or(MalformedRecord::InvalidTimestamp { field: "end" })?;

        let date = obj.get("date").and_then(Value::as_str).map(str::to_string);
        let time = obj.get("time").and_then(Value::as_str).map(str::to_string);
        let notes = obj
            .get("notes")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(ClosureRecord {
            status,
            kind,
            date,
            time,
            window: TimeWindow::new(start, end),
            notes,
        })
    }

    /// Validates a whole feed payload, skipping malformed items.
    ///
    /// Returns the valid records and the count of items skipped. Each skip
    /// is logged at `warn` with its reason.
    pub fn parse_feed(items: &[Value]) -> (Vec<ClosureRecord>, usize) {
        let mut records = Vec::with_capacity(items.len());
        let mut skipped = 0;

        for item in items {
            match ClosureRecord::from_raw(item) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    warn!(%reason, item = %item, "skipping malformed feed item");
                    skipped += 1;
                }
            }
        }

        (records, skipped)
    }
}

/// Accepts an integer timestamp, or a string of digits (seen in older feed
/// revisions). Anything else is invalid.
fn coerce_timestamp(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}
