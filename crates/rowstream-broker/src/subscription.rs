//! Subscription bookkeeping.

use std::time::Instant;

use tokio::sync::mpsc;

use rowstream_proto::ChangeEvent;

use crate::predicate::RowPredicate;

/// An active subscription registered with the broker.
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    /// Unique subscription ID.
    pub id: u64,
    /// Resource being watched.
    pub resource: String,
    /// Channel name derived from the subscription spec.
    pub channel: String,
    /// Parsed predicate, if the spec carried one.
    pub predicate: Option<RowPredicate>,
    /// When the subscription was created.
    pub created_at: Instant,
    /// Number of events delivered to this subscription.
    pub events_sent: u64,
    /// Delivery side of the subscriber's event channel. `None` once
    /// the channel has been dropped (dead subscriber).
    pub(crate) sender: Option<mpsc::Sender<ChangeEvent>>,
}

impl SubscriptionEntry {
    /// Create a new subscription entry.
    pub(crate) fn new(
        id: u64,
        resource: impl Into<String>,
        channel: impl Into<String>,
        predicate: Option<RowPredicate>,
        sender: mpsc::Sender<ChangeEvent>,
    ) -> Self {
        Self {
            id,
            resource: resource.into(),
            channel: channel.into(),
            predicate,
            created_at: Instant::now(),
            events_sent: 0,
            sender: Some(sender),
        }
    }

    /// Get the age of this subscription.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Whether the subscriber's channel is still open.
    pub fn is_live(&self) -> bool {
        self.sender.is_some()
    }

    /// Increment the events delivered counter.
    pub(crate) fn record_event(&mut self) {
        self.events_sent += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_entry() {
        let (tx, _rx) = mpsc::channel(1);
        let entry = SubscriptionEntry::new(1, "topics", "topics-changes-all", None, tx);

        assert_eq!(entry.id, 1);
        assert_eq!(entry.resource, "topics");
        assert_eq!(entry.channel, "topics-changes-all");
        assert_eq!(entry.events_sent, 0);
        assert!(entry.is_live());
    }

    #[test]
    fn test_record_event() {
        let (tx, _rx) = mpsc::channel(1);
        let mut entry = SubscriptionEntry::new(2, "tasks", "tasks-changes-all", None, tx);

        entry.record_event();
        entry.record_event();
        assert_eq!(entry.events_sent, 2);
    }
}
