//! Deterministic identities for upstream closure events.
//!
//! The feed exposes no stable event key: items are re-sent wholesale on
//! every poll and may be reordered or reworded between polls. This module
//! derives an identity from the fields that actually define an event, so
//! the same event seen again maps to the same [`ClosureId`].
//!
//! # Canonical Fields
//!
//! `status | start | end | type`, pipe-delimited, hashed as a UUIDv5 under a
//! fixed DNS-derived namespace. Display-only fields (`date`, `time`,
//! `notes`) are excluded: upstream rewording must not make an old event
//! look new.
//!
//! # Collisions
//!
//! Two genuinely distinct events sharing status, type, and the exact same
//! second-granularity window would merge. The feed describes single-site
//! road closures, where that combination does not occur in practice.

use std::sync::LazyLock;

use uuid::Uuid;

use crate::types::{ClosureId, ClosureRecord};

/// Namespace for closure identities, fixed for the lifetime of the
/// persisted seen set. Derived from the feed's host name.
static CLOSURE_NAMESPACE: LazyLock<Uuid> =
    LazyLock::new(|| Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"starbase.nerdpg.live.closures"));

/// Derives the identity of a closure record.
///
/// Pure and total over validated records: two records with identical
/// (status, start, end, type) always derive the same identity, and any
/// difference in one of those fields derives a different one.
pub fn derive(record: &ClosureRecord) -> ClosureId {
    let name = format!(
        "{}|{}|{}|{}",
        record.status, record.window.start, record.window.end, record.kind
    );
    ClosureId(Uuid::new_v5(&CLOSURE_NAMESPACE, name.as_bytes()))
}
