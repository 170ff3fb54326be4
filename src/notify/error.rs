//! Per-subscriber delivery error taxonomy.
//!
//! The distinction drives what happens to the subscriber, not the event:
//!
//! - **Permanent** failures (channel deleted, access forbidden) mean the
//!   subscriber can never be reached again and is removed from the set.
//! - **Transient** failures (rate limits, network hiccups) leave the
//!   subscriber in place; it is simply tried again on the next new event.
//!
//! Whether the *event* is retried depends on the whole batch: an event
//! that reached zero subscribers is not marked seen and comes back next
//! poll.

use thiserror::Error;

/// A failure delivering one notification to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The subscriber is gone for good (deleted channel, revoked access).
    #[error("permanent delivery failure: {message}")]
    Permanent { message: String },

    /// The subscriber is temporarily unreachable (rate limit, outage).
    #[error("transient delivery failure: {message}")]
    Transient { message: String },
}

impl DeliveryError {
    pub fn permanent(message: impl Into<String>) -> Self {
        DeliveryError::Permanent {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        DeliveryError::Transient {
            message: message.into(),
        }
    }

    /// Whether the subscriber should be dropped from the subscriber set.
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Permanent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanence_classification() {
        assert!(DeliveryError::permanent("channel deleted").is_permanent());
        assert!(!DeliveryError::transient("rate limited").is_permanent());
    }
}
