//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! ManagedId where a ClosureId is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A subscriber channel identifier.
///
/// Opaque to this crate; the host chat platform resolves it to a deliverable
/// destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChannelId {
    fn from(n: u64) -> Self {
        ChannelId(n)
    }
}

/// The derived identity of an upstream closure event.
///
/// The feed provides no stable key, so identities are derived
/// deterministically from the event's canonical fields (see the `identity`
/// module). Persisted as a UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClosureId(pub Uuid);

impl ClosureId {
    /// Returns a short (8-character) prefix for display.
    pub fn short(&self) -> String {
        let s = self.0.to_string();
        s[..8].to_string()
    }
}

impl fmt::Display for ClosureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ClosureId {
    fn from(u: Uuid) -> Self {
        ClosureId(u)
    }
}

/// The bot-assigned identifier of a locally managed closure.
///
/// Random (v4), assigned at creation, never derived from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagedId(pub Uuid);

impl ManagedId {
    /// Assigns a fresh random identifier.
    pub fn assign() -> Self {
        ManagedId(Uuid::new_v4())
    }

    /// Parses an identifier from its string form.
    ///
    /// Returns `None` if the string is not a valid UUID.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(ManagedId)
    }
}

impl fmt::Display for ManagedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_serializes_as_bare_integer() {
        let json = serde_json::to_string(&ChannelId(761234987)).unwrap();
        assert_eq!(json, "761234987");
        let parsed: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ChannelId(761234987));
    }

    #[test]
    fn closure_id_serializes_as_uuid_string() {
        let id = ClosureId(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
    }

    #[test]
    fn closure_id_short_is_eight_chars() {
        let id = ClosureId(Uuid::nil());
        assert_eq!(id.short(), "00000000");
    }

    #[test]
    fn managed_id_parse_roundtrip() {
        let id = ManagedId::assign();
        let parsed = ManagedId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn managed_id_parse_rejects_garbage() {
        assert!(ManagedId::parse("not-a-uuid").is_none());
        assert!(ManagedId::parse("").is_none());
    }
}
