//! The in-memory change broker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use rowstream_proto::{ChangeEvent, SubscriptionSpec};

use crate::error::Error;
use crate::predicate::RowPredicate;
use crate::subscription::SubscriptionEntry;

/// Default capacity of each subscriber's event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broker for change subscriptions and event fan-out.
///
/// Subscribers register a [`SubscriptionSpec`] and receive matching
/// events on a bounded channel. Publishing never blocks on slow
/// subscribers; events that cannot be delivered are dropped with a
/// warning.
pub struct ChangeBroker {
    /// Active subscriptions keyed by subscription ID.
    subscriptions: RwLock<HashMap<u64, SubscriptionEntry>>,
    /// Index of subscription IDs by resource.
    resource_index: RwLock<HashMap<String, Vec<u64>>>,
    /// Next subscription ID.
    next_subscription_id: AtomicU64,
    /// Capacity for subscriber event channels.
    channel_capacity: usize,
}

impl ChangeBroker {
    /// Create a new broker with the default channel capacity.
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broker with a custom subscriber channel capacity.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            resource_index: RwLock::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
            channel_capacity: capacity.max(1),
        }
    }

    /// Register a subscription.
    ///
    /// Validates the spec, interprets its predicate, and returns the
    /// subscription ID together with the receiving side of the event
    /// channel.
    pub async fn subscribe(
        &self,
        spec: &SubscriptionSpec,
    ) -> Result<(u64, mpsc::Receiver<ChangeEvent>), Error> {
        spec.validate()?;

        let predicate = match &spec.predicate {
            Some(raw) => Some(RowPredicate::parse(raw)?),
            None => None,
        };

        let subscription_id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        let entry = SubscriptionEntry::new(
            subscription_id,
            &spec.resource,
            spec.channel_name(),
            predicate,
            sender,
        );

        {
            let mut subs = self.subscriptions.write().await;
            subs.insert(subscription_id, entry);
        }

        {
            let mut index = self.resource_index.write().await;
            index
                .entry(spec.resource.clone())
                .or_default()
                .push(subscription_id);
        }

        tracing::debug!(
            subscription_id,
            resource = %spec.resource,
            predicate = ?spec.predicate,
            "subscription created"
        );

        Ok((subscription_id, receiver))
    }

    /// Remove a subscription.
    pub async fn unsubscribe(&self, subscription_id: u64) -> Result<(), Error> {
        let entry = {
            let mut subs = self.subscriptions.write().await;
            subs.remove(&subscription_id)
        };

        let entry = entry.ok_or(Error::UnknownSubscription(subscription_id))?;

        {
            let mut index = self.resource_index.write().await;
            if let Some(ids) = index.get_mut(&entry.resource) {
                ids.retain(|&id| id != subscription_id);
                if ids.is_empty() {
                    index.remove(&entry.resource);
                }
            }
        }

        tracing::debug!(
            subscription_id,
            resource = %entry.resource,
            events_sent = entry.events_sent,
            "subscription removed"
        );

        Ok(())
    }

    /// Publish a change event to every matching subscription.
    ///
    /// Returns the number of subscriptions the event was delivered to.
    pub async fn publish(&self, event: ChangeEvent) -> Result<usize, Error> {
        event.validate().map_err(Error::Proto)?;

        let subscription_ids = {
            let index = self.resource_index.read().await;
            match index.get(&event.resource) {
                Some(ids) => ids.clone(),
                None => return Ok(0),
            }
        };

        let mut delivered = Vec::new();
        {
            let subs = self.subscriptions.read().await;
            for subscription_id in subscription_ids {
                let Some(entry) = subs.get(&subscription_id) else {
                    continue;
                };
                let Some(sender) = &entry.sender else {
                    continue;
                };

                if let Some(predicate) = &entry.predicate {
                    let matches = event.row().map(|row| predicate.matches(row));
                    if matches != Some(true) {
                        continue;
                    }
                }

                match sender.try_send(event.clone()) {
                    Ok(()) => delivered.push(subscription_id),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscription_id,
                            resource = %event.resource,
                            "subscriber channel full, dropping event"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::warn!(
                            subscription_id,
                            resource = %event.resource,
                            "subscriber channel closed, dropping event"
                        );
                    }
                }
            }
        }

        if !delivered.is_empty() {
            let mut subs = self.subscriptions.write().await;
            for subscription_id in &delivered {
                if let Some(entry) = subs.get_mut(subscription_id) {
                    entry.record_event();
                }
            }
        }

        tracing::trace!(
            resource = %event.resource,
            kind = ?event.kind,
            delivered = delivered.len(),
            "published change event"
        );

        Ok(delivered.len())
    }

    /// Close a subscriber's event channel without deregistering the
    /// subscription. Used to simulate a channel failure.
    ///
    /// Returns false if the subscription does not exist or its channel
    /// is already gone.
    pub async fn drop_subscription_channel(&self, subscription_id: u64) -> bool {
        let mut subs = self.subscriptions.write().await;
        match subs.get_mut(&subscription_id) {
            Some(entry) => entry.sender.take().is_some(),
            None => false,
        }
    }

    /// Get the number of active subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Get subscription IDs watching a specific resource.
    pub async fn subscriptions_for_resource(&self, resource: &str) -> Vec<u64> {
        let index = self.resource_index.read().await;
        index.get(resource).cloned().unwrap_or_default()
    }

    /// Get a subscription by ID.
    pub async fn get_subscription(&self, subscription_id: u64) -> Option<SubscriptionEntry> {
        let subs = self.subscriptions.read().await;
        subs.get(&subscription_id).cloned()
    }
}

impl Default for ChangeBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared broker handle.
pub type SharedChangeBroker = Arc<ChangeBroker>;

#[cfg(test)]
mod tests {
    use super::*;
    use rowstream_proto::Record;

    fn row(id: u64) -> Record {
        let mut record = Record::new();
        record.insert("id".to_string(), serde_json::json!(id));
        record
    }

    fn topic_row(id: u64, meeting_id: u64) -> Record {
        let mut record = row(id);
        record.insert("meeting_id".to_string(), serde_json::json!(meeting_id));
        record
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let broker = ChangeBroker::new();

        let spec = SubscriptionSpec::new("topics");
        let (id, _events) = broker.subscribe(&spec).await.unwrap();

        assert_eq!(broker.subscription_count().await, 1);
        assert_eq!(broker.subscriptions_for_resource("topics").await, vec![id]);

        broker.unsubscribe(id).await.unwrap();

        assert_eq!(broker.subscription_count().await, 0);
        assert!(broker.subscriptions_for_resource("topics").await.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown() {
        let broker = ChangeBroker::new();
        assert!(matches!(
            broker.unsubscribe(99).await,
            Err(Error::UnknownSubscription(99))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_bad_specs() {
        let broker = ChangeBroker::new();

        assert!(broker.subscribe(&SubscriptionSpec::new("")).await.is_err());
        assert!(broker
            .subscribe(&SubscriptionSpec::new("topics").with_predicate("not a predicate"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_publish_delivers_to_subscriber() {
        let broker = ChangeBroker::new();

        let (id, mut events) = broker
            .subscribe(&SubscriptionSpec::new("topics"))
            .await
            .unwrap();

        let delivered = broker
            .publish(ChangeEvent::created("topics", row(1)))
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.resource, "topics");

        let entry = broker.get_subscription(id).await.unwrap();
        assert_eq!(entry.events_sent, 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let broker = ChangeBroker::new();

        let delivered = broker
            .publish(ChangeEvent::created("topics", row(1)))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_publish_rejects_malformed_event() {
        let broker = ChangeBroker::new();

        let mut event = ChangeEvent::created("topics", row(1));
        event.before = Some(row(0));
        assert!(broker.publish(event).await.is_err());
    }

    #[tokio::test]
    async fn test_predicate_filters_rows() {
        let broker = ChangeBroker::new();

        let spec = SubscriptionSpec::new("topics").with_predicate("meeting_id=eq.42");
        let (_, mut events) = broker.subscribe(&spec).await.unwrap();

        let delivered = broker
            .publish(ChangeEvent::created("topics", topic_row(1, 7)))
            .await
            .unwrap();
        assert_eq!(delivered, 0);

        let delivered = broker
            .publish(ChangeEvent::created("topics", topic_row(2, 42)))
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.row().unwrap()["id"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_delete_filtered_by_before_row() {
        let broker = ChangeBroker::new();

        let spec = SubscriptionSpec::new("topics").with_predicate("meeting_id=eq.42");
        let (_, mut events) = broker.subscribe(&spec).await.unwrap();

        let delivered = broker
            .publish(ChangeEvent::deleted("topics", topic_row(1, 42)))
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert!(events.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_multiple_subscriptions() {
        let broker = ChangeBroker::new();

        let spec = SubscriptionSpec::new("topics");
        let (id1, mut events1) = broker.subscribe(&spec).await.unwrap();
        let (id2, mut events2) = broker.subscribe(&spec).await.unwrap();
        assert_ne!(id1, id2);

        let delivered = broker
            .publish(ChangeEvent::updated("topics", row(1), row(2)))
            .await
            .unwrap();
        assert_eq!(delivered, 2);

        assert!(events1.recv().await.is_some());
        assert!(events2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_dropped_channel_skipped() {
        let broker = ChangeBroker::new();

        let (id, mut events) = broker
            .subscribe(&SubscriptionSpec::new("topics"))
            .await
            .unwrap();

        assert!(broker.drop_subscription_channel(id).await);
        assert!(!broker.drop_subscription_channel(id).await);

        // Subscriber observes the closed channel.
        assert!(events.recv().await.is_none());

        // Still registered, but no longer delivered to.
        assert_eq!(broker.subscription_count().await, 1);
        let delivered = broker
            .publish(ChangeEvent::created("topics", row(1)))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_full_channel_drops_event() {
        let broker = ChangeBroker::with_channel_capacity(1);

        let (_, mut events) = broker
            .subscribe(&SubscriptionSpec::new("topics"))
            .await
            .unwrap();

        let first = broker
            .publish(ChangeEvent::created("topics", row(1)))
            .await
            .unwrap();
        let second = broker
            .publish(ChangeEvent::created("topics", row(2)))
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);

        // Only the first event made it through.
        let event = events.recv().await.unwrap();
        assert_eq!(event.row().unwrap()["id"], serde_json::json!(1));
    }
}
