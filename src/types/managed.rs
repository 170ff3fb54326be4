//! Locally managed closures.
//!
//! Operators can enter closures by hand; these live alongside the upstream
//! feed in the merged display list but never pass through deduplication;
//! they carry bot-assigned random ids instead of derived identities.
//!
//! Creation and editing take a validated field struct supplied all at once.

use serde::{Deserialize, Serialize};

use super::closure::{ClosureRecord, TimeWindow};
use super::ids::ManagedId;

/// A closure record entered by an operator.
///
/// Same display shape as a feed record, plus the bot-assigned id used for
/// edit and remove commands. Stored in the persistent state blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedClosure {
    pub id: ManagedId,

    pub status: String,

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

impl ManagedClosure {
    /// Creates a managed closure from validated fields, assigning a fresh id.
    pub fn create(fields: ManagedClosureFields) -> Self {
        ManagedClosure {
            id: ManagedId::assign(),
            status: fields.status,
            kind: fields.kind,
            date: fields.date,
            time: fields.time,
            window: TimeWindow::new(fields.start, fields.end),
            notes: fields.notes,
        }
    }

    /// Applies an edit: `Some` fields replace, `None` fields are kept.
    pub fn apply_edit(&mut self, edit: ManagedClosureEdit) {
        if let Some(status) = edit.status {
            self.status = status;
        }
        if let Some(kind) = edit.kind {
            self.kind = kind;
        }
        if let Some(date) = edit.date {
            self.date = date;
        }
        if let Some(time) = edit.time {
            self.time = time;
        }
        if let Some(start) = edit.start {
            self.window.start = start;
        }
        if let Some(end) = edit.end {
            self.window.end = end;
        }
        if let Some(notes) = edit.notes {
            self.notes = notes;
        }
    }

    /// Whether the closure should still appear in the merged display list.
    pub fn active_at(&self, now: i64) -> bool {
        !self.window.ended_by(now)
    }

    /// The record shape used for the merged display list.
    pub fn as_record(&self) -> ClosureRecord {
        ClosureRecord {
            status: self.status.clone(),
            kind: self.kind.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
            window: self.window,
            notes: self.notes.clone(),
        }
    }
}

/// All fields of a new managed closure, supplied in one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedClosureFields {
    pub status: String,
    pub kind: String,
    pub date: Option<String>,
    pub time: Option<String>,
    /// Unix seconds.
    pub start: i64,
    /// Unix seconds.
    pub end: i64,
    pub notes: Option<String>,
}

/// A partial edit to a managed closure.
///
/// Outer `None` means "leave unchanged"; for `date`/`time`/`notes`,
/// `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedClosureEdit {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub date: Option<Option<String>>,
    pub time: Option<Option<String>>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub notes: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ManagedClosureFields {
        ManagedClosureFields {
            status: "Closure Scheduled".to_string(),
            kind: "Primary Date".to_string(),
            date: Some("May 12, 2025".to_string()),
            time: Some("10:00 a.m. to 4:00 p.m.".to_string()),
            start: 1747065600,
            end: 1747087200,
            notes: None,
        }
    }

    #[test]
    fn create_assigns_distinct_ids() {
        let a = ManagedClosure::create(fields());
        let b = ManagedClosure::create(fields());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn edit_replaces_only_supplied_fields() {
        let mut closure = ManagedClosure::create(fields());
        let original_id = closure.id;

        closure.apply_edit(ManagedClosureEdit {
            status: Some("Closure Revoked".to_string()),
            end: Some(1747090000),
            notes: Some(Some("pushed back".to_string())),
            ..Default::default()
        });

        assert_eq!(closure.id, original_id);
        assert_eq!(closure.status, "Closure Revoked");
        assert_eq!(closure.kind, "Primary Date");
        assert_eq!(closure.window.start, 1747065600);
        assert_eq!(closure.window.end, 1747090000);
        assert_eq!(closure.notes.as_deref(), Some("pushed back"));
    }

    #[test]
    fn edit_can_clear_optional_fields() {
        let mut closure = ManagedClosure::create(fields());
        closure.apply_edit(ManagedClosureEdit {
            date: Some(None),
            time: Some(None),
            ..Default::default()
        });
        assert_eq!(closure.date, None);
        assert_eq!(closure.time, None);
    }

    #[test]
    fn active_until_end_passes() {
        let closure = ManagedClosure::create(fields());
        assert!(closure.active_at(1747087199));
        assert!(!closure.active_at(1747087200));
    }

    #[test]
    fn as_record_matches_fields() {
        let closure = ManagedClosure::create(fields());
        let record = closure.as_record();
        assert_eq!(record.status, closure.status);
        assert_eq!(record.window, closure.window);
    }

    #[test]
    fn serde_uses_wire_field_names() {
        let closure = ManagedClosure::create(fields());
        let json = serde_json::to_value(&closure).unwrap();
        assert!(json.get("type").is_some());
        assert!(json["timestamps"].get("end").is_some());
        let back: ManagedClosure = serde_json::from_value(json).unwrap();
        assert_eq!(back, closure);
    }
}
