//! New-event computation and seen-set maintenance.
//!
//! [`reconcile`] is the pure core: given the latest validated feed and the
//! set of identities already notified, it computes which events are new.
//! The companion functions maintain the seen set after delivery:
//!
//! - [`mark_delivered`] folds in identities whose notification reached at
//!   least one subscriber. Identities that reached nobody stay out, so the
//!   next poll retries them wholesale.
//! - [`prune_departed`] intersects the seen set with the latest feed's
//!   identity set, bounding its size. An event that drops out of the feed
//!   and later reappears with the same canonical fields is treated as new
//!   again. Callers only prune after a genuinely fresh fetch; pruning
//!   against stale cache contents would forget identities the upstream
//!   still reports.

use std::collections::BTreeSet;

use crate::identity;
use crate::types::{ClosureId, ClosureRecord};

/// The persisted set of identities already notified.
///
/// Ordered so the serialized state blob is byte-stable across runs.
pub type SeenSet = BTreeSet<ClosureId>;

/// Result of comparing the latest feed against the seen set.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Events not yet notified, sorted by start timestamp.
    pub new_records: Vec<(ClosureId, ClosureRecord)>,

    /// Identities of every record in the latest feed, for pruning.
    pub all_identities: BTreeSet<ClosureId>,
}

/// Computes which of the latest records are new.
///
/// Records whose derived identity appears in `seen` are skipped; the rest
/// are returned sorted by start timestamp for deterministic dispatch order.
/// Duplicate identities within a single feed payload collapse to one entry.
pub fn reconcile(latest: &[ClosureRecord], seen: &SeenSet) -> Reconciliation {
    let mut all_identities = BTreeSet::new();
    let mut new_records: Vec<(ClosureId, ClosureRecord)> = Vec::new();

    for record in latest {
        let id = identity::derive(record);
        let first_occurrence = all_identities.insert(id);

        if first_occurrence && !seen.contains(&id) {
            new_records.push((id, record.clone()));
        }
    }

    new_records.sort_by_key(|(_, record)| record.window.start);

    Reconciliation {
        new_records,
        all_identities,
    }
}

/// Records identities as notified.
///
/// Call only with identities from batches that reached at least one
/// subscriber.
pub fn mark_delivered(seen: &mut SeenSet, delivered: impl IntoIterator<Item = ClosureId>) {
    seen.extend(delivered);
}

/// Drops identities no longer present in the latest feed.
///
/// Returns the number of identities pruned.
pub fn prune_departed(seen: &mut SeenSet, all_identities: &BTreeSet<ClosureId>) -> usize {
    let before = seen.len();
    seen.retain(|id| all_identities.contains(id));
    before - seen.len()
}
