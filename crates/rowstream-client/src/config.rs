//! Subscription options and reconnect policy.

use std::time::Duration;

/// Delay before reconnecting after a channel error.
pub const CHANNEL_ERROR_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Delay before reconnecting after a subscribe timeout.
pub const TIMEOUT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// The category of a stream failure, used to pick the reconnect delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The backend reported the channel entered an error state, or the
    /// stream ended unexpectedly.
    ChannelError,
    /// The subscribe handshake did not complete in time.
    Timeout,
}

/// Reconnect policy: a fixed delay per failure category.
///
/// There is deliberately no exponential backoff and no jitter. Callers
/// treat every notification as an invalidation signal and refetch, so
/// duplicate or delayed notifications are harmless; the fixed delays
/// keep the policy trivially reviewable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after a channel error.
    pub on_channel_error: Duration,
    /// Delay after a subscribe timeout.
    pub on_timeout: Duration,
    /// Maximum reconnect attempts before giving up. `None` retries
    /// forever. The counter resets every time the stream becomes
    /// active again.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Create the default policy: 5 s after a channel error, 3 s after
    /// a timeout, retrying forever.
    pub fn new() -> Self {
        Self {
            on_channel_error: CHANNEL_ERROR_RECONNECT_DELAY,
            on_timeout: TIMEOUT_RECONNECT_DELAY,
            max_attempts: None,
        }
    }

    /// Set the delay applied after a channel error.
    pub fn with_channel_error_delay(mut self, delay: Duration) -> Self {
        self.on_channel_error = delay;
        self
    }

    /// Set the delay applied after a subscribe timeout.
    pub fn with_timeout_delay(mut self, delay: Duration) -> Self {
        self.on_timeout = delay;
        self
    }

    /// Limit the number of reconnect attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Look up the delay for a failure category.
    pub fn delay_for(&self, kind: FailureKind) -> Duration {
        match kind {
            FailureKind::ChannelError => self.on_channel_error,
            FailureKind::Timeout => self.on_timeout,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for opening a subscription.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// When false, opening is a no-op and the subscription stays idle.
    pub enabled: bool,
    /// Reconnect policy for stream failures.
    pub policy: ReconnectPolicy,
}

impl SubscribeOptions {
    /// Create the default options: enabled, default reconnect policy.
    pub fn new() -> Self {
        Self {
            enabled: true,
            policy: ReconnectPolicy::new(),
        }
    }

    /// Create options for a disabled subscription.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            policy: ReconnectPolicy::new(),
        }
    }

    /// Set the reconnect policy.
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self::new()
    }
}
