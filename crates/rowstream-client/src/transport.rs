//! The transport seam between subscriptions and their backend.

use std::sync::Arc;

use tokio::sync::mpsc;

use rowstream_broker::ChangeBroker;
use rowstream_proto::{ChangeEvent, SubscriptionSpec};

use crate::error::Error;

/// Capacity of the per-channel message queue.
const CHANNEL_QUEUE_CAPACITY: usize = 64;

/// Backend-reported state of a live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The backend acknowledged the subscription.
    Subscribed,
    /// The channel entered an error state.
    Error(String),
    /// The subscribe handshake timed out.
    TimedOut,
    /// The channel was closed by the backend.
    Closed,
}

/// A message delivered on a live channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// A channel state transition.
    Status(ChannelStatus),
    /// A row change event.
    Event(ChangeEvent),
}

/// A live channel to the backend's change stream.
///
/// Exclusively owned by the subscription that opened it; dropping or
/// closing it releases the backend-side resources via the registered
/// closer.
pub struct Channel {
    messages: mpsc::Receiver<ChannelMessage>,
    closer: Option<Box<dyn FnOnce() + Send>>,
}

impl Channel {
    /// Create a channel from a message receiver.
    pub fn new(messages: mpsc::Receiver<ChannelMessage>) -> Self {
        Self {
            messages,
            closer: None,
        }
    }

    /// Register a closer invoked exactly once when the channel is
    /// closed or dropped.
    pub fn with_closer(mut self, closer: impl FnOnce() + Send + 'static) -> Self {
        self.closer = Some(Box::new(closer));
        self
    }

    /// Receive the next message. Returns `None` once the stream ends.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.messages.recv().await
    }

    /// Close the channel, releasing backend resources.
    pub fn close(mut self) {
        self.run_closer();
    }

    fn run_closer(&mut self) {
        if let Some(closer) = self.closer.take() {
            closer();
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.run_closer();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("has_closer", &self.closer.is_some())
            .finish()
    }
}

/// A factory for live change channels.
///
/// Subscriptions hold their transport as an explicit dependency; any
/// backend that can produce a [`Channel`] per spec can drive them.
#[async_trait::async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open a channel for the given spec. The spec's predicate must be
    /// forwarded verbatim.
    async fn open(&self, spec: &SubscriptionSpec) -> Result<Channel, Error>;
}

/// Transport backed by an in-process [`ChangeBroker`].
pub struct BrokerTransport {
    broker: Arc<ChangeBroker>,
}

impl BrokerTransport {
    /// Create a transport over a shared broker.
    pub fn new(broker: Arc<ChangeBroker>) -> Self {
        Self { broker }
    }

    /// Access the underlying broker.
    pub fn broker(&self) -> &Arc<ChangeBroker> {
        &self.broker
    }
}

#[async_trait::async_trait]
impl ChannelTransport for BrokerTransport {
    async fn open(&self, spec: &SubscriptionSpec) -> Result<Channel, Error> {
        let (subscription_id, mut events) = self.broker.subscribe(spec).await?;

        let (tx, rx) = mpsc::channel(CHANNEL_QUEUE_CAPACITY);

        // The broker registered us; the subscription is live.
        let _ = tx.try_send(ChannelMessage::Status(ChannelStatus::Subscribed));

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Some(event) => {
                        if tx.send(ChannelMessage::Event(event)).await.is_err() {
                            // Channel owner went away.
                            break;
                        }
                    }
                    None => {
                        let _ = tx.send(ChannelMessage::Status(ChannelStatus::Closed)).await;
                        break;
                    }
                }
            }
        });

        let broker = self.broker.clone();
        let channel_name = spec.channel_name();
        Ok(Channel::new(rx).with_closer(move || {
            tokio::spawn(async move {
                if let Err(e) = broker.unsubscribe(subscription_id).await {
                    tracing::debug!(
                        subscription_id,
                        channel = %channel_name,
                        error = %e,
                        "unsubscribe on close failed"
                    );
                }
            });
        }))
    }
}
