//! Self-healing change subscriptions.
//!
//! A [`ChangeSubscription`] owns one logical subscription to a
//! resource's change stream. A driver task holds the live [`Channel`]
//! exclusively, dispatches events into the registered handlers, and
//! re-establishes the stream after failures using the configured
//! [`ReconnectPolicy`](crate::ReconnectPolicy). Failures are never
//! surfaced to the caller; the subscription keeps trying until it is
//! closed.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;

use rowstream_proto::{ChangeEvent, ChangeKind, Record, SubscriptionSpec};

use crate::config::{FailureKind, ReconnectPolicy, SubscribeOptions};
use crate::error::Error;
use crate::handlers::ChangeHandlers;
use crate::transport::{Channel, ChannelMessage, ChannelStatus, ChannelTransport};

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No stream; initial state, kept when the subscription is disabled.
    Idle,
    /// A channel is being opened, awaiting the backend's ack.
    Connecting,
    /// The backend acknowledged; events are being delivered.
    Active,
    /// The stream failed; a reconnect is pending.
    Recovering,
    /// Terminal. Entered on [`SubscriptionHandle::close`].
    Closed,
}

/// Builder for one change subscription.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use rowstream_client::{BrokerTransport, ChangeHandlers, ChangeSubscription};
/// use rowstream_proto::SubscriptionSpec;
///
/// let transport: Arc<dyn ChannelTransport> = Arc::new(BrokerTransport::new(broker));
///
/// let handle = ChangeSubscription::new(transport, SubscriptionSpec::new("priorities"))
///     .handlers(ChangeHandlers::<Priority>::new().on_created(|row| {
///         // invalidate and refetch
///     }))
///     .open();
///
/// // ... later
/// handle.close();
/// ```
pub struct ChangeSubscription<T> {
    transport: Arc<dyn ChannelTransport>,
    spec: SubscriptionSpec,
    handlers: ChangeHandlers<T>,
    options: SubscribeOptions,
}

impl<T: DeserializeOwned + Send + 'static> ChangeSubscription<T> {
    /// Create a subscription over the given transport and spec.
    pub fn new(transport: Arc<dyn ChannelTransport>, spec: SubscriptionSpec) -> Self {
        Self {
            transport,
            spec,
            handlers: ChangeHandlers::new(),
            options: SubscribeOptions::default(),
        }
    }

    /// Set the change handlers.
    pub fn handlers(mut self, handlers: ChangeHandlers<T>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Set the subscribe options.
    pub fn options(mut self, options: SubscribeOptions) -> Self {
        self.options = options;
        self
    }

    /// Open the subscription.
    ///
    /// Never fails: an invalid spec or a disabled subscription yields
    /// an idle handle, and connection failures are handled internally
    /// by the reconnect policy. The returned handle is the only way to
    /// tear the subscription down.
    pub fn open(self) -> SubscriptionHandle {
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Idle);
        let state_tx = Arc::new(state_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = SubscriptionHandle {
            state_tx: state_tx.clone(),
            state_rx,
            shutdown: shutdown_tx,
        };

        if !self.options.enabled {
            tracing::debug!(
                channel = %self.spec.channel_name(),
                "subscription disabled, staying idle"
            );
            return handle;
        }

        if let Err(e) = self.spec.validate() {
            tracing::warn!(error = %e, "ignoring invalid subscription spec");
            return handle;
        }

        let driver = Driver {
            transport: self.transport,
            spec: self.spec,
            handlers: self.handlers,
            policy: self.options.policy,
            state: state_tx,
            shutdown: shutdown_rx,
        };
        tokio::spawn(driver.run());

        handle
    }
}

/// Handle to a live subscription.
///
/// Closing is idempotent and cancels any pending reconnect. The handle
/// closes the subscription when dropped.
pub struct SubscriptionHandle {
    state_tx: Arc<watch::Sender<SubscriptionState>>,
    state_rx: watch::Receiver<SubscriptionState>,
    shutdown: watch::Sender<bool>,
}

impl SubscriptionHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        *self.state_rx.borrow()
    }

    /// A watch receiver observing state transitions.
    pub fn state_changes(&self) -> watch::Receiver<SubscriptionState> {
        self.state_rx.clone()
    }

    /// Whether the subscription has been closed.
    pub fn is_closed(&self) -> bool {
        self.state() == SubscriptionState::Closed
    }

    /// Close the subscription.
    ///
    /// Transitions to [`SubscriptionState::Closed`] immediately,
    /// cancels any pending reconnect, and releases the live channel.
    /// Closing an already-closed subscription is a no-op.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        let _ = self.shutdown.send(true);
        let _ = self.state_tx.send(SubscriptionState::Closed);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// How a channel's message stream ended.
enum StreamEnd {
    Failure(FailureKind, String),
    Shutdown,
}

/// Whether to keep reconnecting after a failure.
enum Recover {
    Retry,
    Stop,
}

/// The driver task: exclusively owns the live channel.
struct Driver<T> {
    transport: Arc<dyn ChannelTransport>,
    spec: SubscriptionSpec,
    handlers: ChangeHandlers<T>,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<SubscriptionState>>,
    shutdown: watch::Receiver<bool>,
}

impl<T: DeserializeOwned + Send + 'static> Driver<T> {
    async fn run(mut self) {
        let channel_name = self.spec.channel_name();
        let mut attempts: u32 = 0;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.set_state(SubscriptionState::Connecting);
            tracing::debug!(channel = %channel_name, "opening channel");

            let opened = {
                let open = self.transport.open(&self.spec);
                tokio::pin!(open);
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => break,
                    opened = &mut open => opened,
                }
            };

            let end = match opened {
                Ok(mut channel) => {
                    let end = self.pump(&mut channel, &mut attempts, &channel_name).await;
                    // Tear the old channel down before any reconnect.
                    channel.close();
                    end
                }
                Err(e) => {
                    let kind = match e {
                        Error::Timeout => FailureKind::Timeout,
                        _ => FailureKind::ChannelError,
                    };
                    StreamEnd::Failure(kind, e.to_string())
                }
            };

            match end {
                StreamEnd::Shutdown => break,
                StreamEnd::Failure(kind, reason) => {
                    tracing::warn!(
                        channel = %channel_name,
                        kind = ?kind,
                        reason = %reason,
                        "channel failed"
                    );
                    match self.recover(kind, &mut attempts, &channel_name).await {
                        Recover::Retry => continue,
                        Recover::Stop => break,
                    }
                }
            }
        }

        let _ = self.state.send(SubscriptionState::Closed);
        tracing::debug!(channel = %channel_name, "subscription closed");
    }

    /// Pump channel messages until the stream fails or shutdown is
    /// requested.
    async fn pump(
        &mut self,
        channel: &mut Channel,
        attempts: &mut u32,
        channel_name: &str,
    ) -> StreamEnd {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown.changed() => return StreamEnd::Shutdown,
                message = channel.recv() => message,
            };

            match message {
                Some(ChannelMessage::Status(ChannelStatus::Subscribed)) => {
                    *attempts = 0;
                    self.set_state(SubscriptionState::Active);
                    tracing::debug!(channel = %channel_name, "subscription active");
                }
                Some(ChannelMessage::Status(ChannelStatus::Error(reason))) => {
                    return StreamEnd::Failure(FailureKind::ChannelError, reason);
                }
                Some(ChannelMessage::Status(ChannelStatus::TimedOut)) => {
                    return StreamEnd::Failure(
                        FailureKind::Timeout,
                        "subscribe handshake timed out".to_string(),
                    );
                }
                Some(ChannelMessage::Status(ChannelStatus::Closed)) | None => {
                    return StreamEnd::Failure(
                        FailureKind::ChannelError,
                        "channel closed by backend".to_string(),
                    );
                }
                Some(ChannelMessage::Event(event)) => self.dispatch(event),
            }
        }
    }

    /// Wait out the reconnect delay for a failure, unless shutdown
    /// arrives first or the attempt budget is exhausted.
    async fn recover(
        &mut self,
        kind: FailureKind,
        attempts: &mut u32,
        channel_name: &str,
    ) -> Recover {
        *attempts += 1;
        if let Some(max) = self.policy.max_attempts {
            if *attempts > max {
                tracing::error!(
                    channel = %channel_name,
                    max_attempts = max,
                    "reconnect attempts exhausted, giving up"
                );
                return Recover::Stop;
            }
        }

        let delay = self.policy.delay_for(kind);
        self.set_state(SubscriptionState::Recovering);
        tracing::debug!(
            channel = %channel_name,
            kind = ?kind,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );

        tokio::select! {
            biased;
            _ = self.shutdown.changed() => Recover::Stop,
            _ = tokio::time::sleep(delay) => Recover::Retry,
        }
    }

    /// Dispatch one change event into the handler for its kind. Kinds
    /// without a handler and rows that fail to deserialize are
    /// dropped.
    fn dispatch(&self, event: ChangeEvent) {
        let ChangeEvent {
            resource,
            kind,
            before,
            after,
        } = event;
        tracing::trace!(resource = %resource, kind = ?kind, "change event");

        match kind {
            ChangeKind::Created => {
                if let Some(handler) = &self.handlers.on_created {
                    match decode::<T>(after) {
                        Ok(row) => handler(row),
                        Err(e) => {
                            tracing::warn!(resource = %resource, error = %e, "dropping undecodable created row");
                        }
                    }
                }
            }
            ChangeKind::Updated => {
                if let Some(handler) = &self.handlers.on_updated {
                    match (decode::<T>(before), decode::<T>(after)) {
                        (Ok(before), Ok(after)) => handler(before, after),
                        (Err(e), _) | (_, Err(e)) => {
                            tracing::warn!(resource = %resource, error = %e, "dropping undecodable updated row");
                        }
                    }
                }
            }
            ChangeKind::Deleted => {
                if let Some(handler) = &self.handlers.on_deleted {
                    match decode::<T>(before) {
                        Ok(row) => handler(row),
                        Err(e) => {
                            tracing::warn!(resource = %resource, error = %e, "dropping undecodable deleted row");
                        }
                    }
                }
            }
        }
    }

    /// Publish a state transition unless shutdown already happened;
    /// the closed state is owned by the close path.
    fn set_state(&self, state: SubscriptionState) {
        if *self.shutdown.borrow() {
            return;
        }
        let _ = self.state.send(state);
    }
}

fn decode<T: DeserializeOwned>(record: Option<Record>) -> Result<T, serde_json::Error> {
    let record = record.unwrap_or_default();
    serde_json::from_value(serde_json::Value::Object(record))
}
