//! Rowstream client - self-healing change subscriptions.
//!
//! This crate provides [`ChangeSubscription`]: one logical
//! subscription to a resource's row-change stream, delivering
//! created/updated/deleted notifications to typed handlers and
//! recovering from transient stream failures with fixed per-failure
//! delays.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use rowstream_broker::ChangeBroker;
//! use rowstream_client::{BrokerTransport, ChangeHandlers, ChangeSubscription};
//! use rowstream_proto::SubscriptionSpec;
//!
//! #[derive(serde::Deserialize)]
//! struct Topic {
//!     id: u64,
//!     title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let broker = Arc::new(ChangeBroker::new());
//!     let transport = Arc::new(BrokerTransport::new(broker.clone()));
//!
//!     let spec = SubscriptionSpec::new("topics").with_predicate("meeting_id=eq.42");
//!     let handle = ChangeSubscription::new(transport, spec)
//!         .handlers(ChangeHandlers::<Topic>::new().on_created(|topic| {
//!             println!("new topic: {}", topic.title);
//!         }))
//!         .open();
//!
//!     // ... publish changes through the broker ...
//!
//!     handle.close();
//! }
//! ```
//!
//! Callers that only need an invalidation signal can use
//! [`ResourceWatcher`] instead of wiring per-kind handlers.

pub mod config;
pub mod error;
pub mod handlers;
pub mod subscription;
pub mod transport;
pub mod watcher;

pub use config::{FailureKind, ReconnectPolicy, SubscribeOptions};
pub use error::Error;
pub use handlers::ChangeHandlers;
pub use subscription::{ChangeSubscription, SubscriptionHandle, SubscriptionState};
pub use transport::{BrokerTransport, Channel, ChannelMessage, ChannelStatus, ChannelTransport};
pub use watcher::ResourceWatcher;

/// Re-export protocol types.
pub use rowstream_proto as proto;
