//! Notification construction.
//!
//! Builds the platform-agnostic message for one new closure event. The
//! host chat layer renders it however it likes (embed, plain text); this
//! module only guarantees the content: a status headline, the
//! authoritative time range derived from the Unix timestamps, the raw
//! upstream `time` string as a supplementary line, and the event kind.
//!
//! The status vocabulary is open. Known statuses get a dedicated emoji and
//! tone; anything new from upstream degrades to the neutral presentation
//! instead of failing.

use chrono::{DateTime, Utc};

use crate::types::{ClosureId, ClosureRecord, TimeWindow};

/// Presentation tone for a status, mapped to a color by the host layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// "Possible Closure": something may happen.
    Warning,
    /// "Closure Scheduled": confirmed.
    Positive,
    /// "Closure Revoked": called off.
    Negative,
    /// "HWY 4 Road Delay": traffic friction, not a closure.
    Caution,
    /// "TFR": airspace restriction.
    Notice,
    /// Anything the upstream vocabulary grows later.
    Neutral,
}

/// Emoji for a status, with an info fallback for unknown values.
pub fn status_emoji(status: &str) -> &'static str {
    match status {
        "Possible Closure" => "⚠️",
        "Closure Scheduled" => "✅",
        "Closure Revoked" => "❌",
        "HWY 4 Road Delay" => "⏳",
        "TFR" => "✈️",
        _ => "ℹ️",
    }
}

/// Tone for a status, neutral for unknown values.
pub fn status_tone(status: &str) -> Tone {
    match status {
        "Possible Closure" => Tone::Warning,
        "Closure Scheduled" => Tone::Positive,
        "Closure Revoked" => Tone::Negative,
        "HWY 4 Road Delay" => Tone::Caution,
        "TFR" => Tone::Notice,
        _ => Tone::Neutral,
    }
}

/// A rendered notification, ready for the host chat layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// e.g. "✅ New Road Update: Closure Scheduled"
    pub title: String,

    /// Labeled content lines in display order.
    pub fields: Vec<(String, String)>,

    /// e.g. "Source: road closure feed | Event 3f1a9c2e"
    pub footer: String,

    pub tone: Tone,
}

/// Builds the notification for one new event.
pub fn render(id: ClosureId, record: &ClosureRecord) -> Notification {
    let mut fields = vec![
        ("Status".to_string(), record.status.clone()),
        ("Event Type".to_string(), record.kind.clone()),
    ];

    let period_label = match &record.date {
        Some(date) => format!("Time Period ({date})"),
        None => "Time Period".to_string(),
    };
    fields.push((period_label, format_window(record.window)));

    if let Some(time) = &record.time {
        fields.push(("Posted Time".to_string(), time.clone()));
    }
    if let Some(notes) = &record.notes {
        fields.push(("Notes".to_string(), notes.clone()));
    }

    Notification {
        title: format!(
            "{} New Road Update: {}",
            status_emoji(&record.status),
            record.status
        ),
        fields,
        footer: format!("Source: road closure feed | Event {}", id.short()),
        tone: status_tone(&record.status),
    }
}

/// Formats the authoritative window as a human-readable UTC range.
///
/// Timestamps outside chrono's representable range fall back to the raw
/// integer, which keeps rendering total over arbitrary feed data.
pub fn format_window(window: TimeWindow) -> String {
    format!(
        "{} to {}",
        format_instant(window.start),
        format_instant(window.end)
    )
}

fn format_instant(unix: i64) -> String {
    match DateTime::<Utc>::from_timestamp(unix, 0) {
        Some(at) => at.format("%a %b %e %Y, %H:%M UTC").to_string(),
        None => format!("t+{unix}"),
    }
}
