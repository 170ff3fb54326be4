//! Fan-out of one notification to all subscriber channels.
//!
//! Each subscriber is attempted independently; one failure never aborts
//! delivery to the rest. The outcome reports who was reached and which
//! subscribers turned out to be permanently invalid, so the owner of the
//! subscriber set can drop them. Transiently failing subscribers are left
//! alone: they catch the next event, there is no per-event retry queue.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::types::ChannelId;

use super::error::DeliveryError;
use super::format::Notification;

/// Sends a rendered notification to one channel.
///
/// Implemented by the host chat platform; tests use scripted fakes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        channel: ChannelId,
        notification: &Notification,
    ) -> Result<(), DeliveryError>;
}

/// The result of fanning one event out to the subscriber set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Subscribers that received the notification.
    pub delivered_to: BTreeSet<ChannelId>,

    /// Subscribers that failed permanently and should be removed.
    pub remove: BTreeSet<ChannelId>,
}

impl DispatchOutcome {
    /// Whether at least one subscriber received the event.
    ///
    /// Only then may the event's identity enter the seen set.
    pub fn any_delivered(&self) -> bool {
        !self.delivered_to.is_empty()
    }
}

/// Delivers `notification` to every subscriber, isolating failures.
pub async fn dispatch(
    notifier: &dyn Notifier,
    notification: &Notification,
    subscribers: &BTreeSet<ChannelId>,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for &channel in subscribers {
        match notifier.send(channel, notification).await {
            Ok(()) => {
                debug!(%channel, "notification delivered");
                outcome.delivered_to.insert(channel);
            }
            Err(err) if err.is_permanent() => {
                warn!(%channel, %err, "subscriber permanently unreachable, dropping");
                outcome.remove.insert(channel);
            }
            Err(err) => {
                warn!(%channel, %err, "subscriber transiently unreachable, keeping");
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity;
    use crate::notify::format::render;
    use crate::test_utils::{sample_record, ScriptedNotifier};

    fn notification() -> Notification {
        let record = sample_record(1);
        render(identity::derive(&record), &record)
    }

    fn channels(ids: &[u64]) -> BTreeSet<ChannelId> {
        ids.iter().copied().map(ChannelId).collect()
    }

    #[tokio::test]
    async fn all_subscribers_reached() {
        let notifier = ScriptedNotifier::default();
        let outcome = dispatch(&notifier, &notification(), &channels(&[1, 2, 3])).await;

        assert_eq!(outcome.delivered_to, channels(&[1, 2, 3]));
        assert!(outcome.remove.is_empty());
        assert_eq!(notifier.sent_to(), vec![ChannelId(1), ChannelId(2), ChannelId(3)]);
    }

    #[tokio::test]
    async fn permanent_failure_is_isolated_and_marked_for_removal() {
        let notifier =
            ScriptedNotifier::default().failing(ChannelId(2), DeliveryError::permanent("gone"));
        let outcome = dispatch(&notifier, &notification(), &channels(&[1, 2, 3])).await;

        assert_eq!(outcome.delivered_to, channels(&[1, 3]));
        assert_eq!(outcome.remove, channels(&[2]));
        assert!(outcome.any_delivered());
        // The failing subscriber must not have blocked later attempts.
        assert_eq!(notifier.sent_to(), vec![ChannelId(1), ChannelId(3)]);
    }

    #[tokio::test]
    async fn transient_failure_keeps_subscriber() {
        let notifier = ScriptedNotifier::default()
            .failing(ChannelId(1), DeliveryError::transient("rate limited"));
        let outcome = dispatch(&notifier, &notification(), &channels(&[1, 2])).await;

        assert_eq!(outcome.delivered_to, channels(&[2]));
        assert!(outcome.remove.is_empty());
    }

    #[tokio::test]
    async fn zero_deliveries_reported() {
        let notifier = ScriptedNotifier::default()
            .failing(ChannelId(1), DeliveryError::transient("outage"))
            .failing(ChannelId(2), DeliveryError::permanent("deleted"));
        let outcome = dispatch(&notifier, &notification(), &channels(&[1, 2])).await;

        assert!(!outcome.any_delivered());
        assert_eq!(outcome.remove, channels(&[2]));
    }

    #[tokio::test]
    async fn empty_subscriber_set_is_a_no_op() {
        let notifier = ScriptedNotifier::default();
        let outcome = dispatch(&notifier, &notification(), &BTreeSet::new()).await;

        assert!(!outcome.any_delivered());
        assert!(notifier.sent_to().is_empty());
    }
}
