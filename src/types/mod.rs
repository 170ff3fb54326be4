//! Core domain types for the closure-watch engine.
//!
//! This module contains the fundamental types used throughout the crate,
//! designed to encode invariants via the type system: validated records out
//! of a single parse step, and newtype ids that cannot be mixed up.

pub mod closure;
pub mod ids;
pub mod managed;

// Re-export commonly used types at the module level
pub use closure::{ClosureRecord, MalformedRecord, TimeWindow};
pub use ids::{ChannelId, ClosureId, ManagedId};
pub use managed::{ManagedClosure, ManagedClosureEdit, ManagedClosureFields};
