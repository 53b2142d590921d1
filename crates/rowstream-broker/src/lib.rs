//! In-memory change broker for rowstream.
//!
//! The broker is the backend side of a change subscription: callers
//! register a [`SubscriptionSpec`](rowstream_proto::SubscriptionSpec)
//! and receive a channel of matching [`ChangeEvent`]s as rows are
//! published. Predicates are interpreted here; the requesting side
//! treats them as opaque strings.
//!
//! # Example
//!
//! ```ignore
//! use rowstream_broker::ChangeBroker;
//! use rowstream_proto::{ChangeEvent, SubscriptionSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = ChangeBroker::new();
//!
//!     let spec = SubscriptionSpec::new("topics").with_predicate("meeting_id=eq.42");
//!     let (id, mut events) = broker.subscribe(&spec).await?;
//!
//!     // ... publish changes, receive them on `events` ...
//!
//!     broker.unsubscribe(id).await?;
//!     Ok(())
//! }
//! ```

mod broker;
mod error;
mod predicate;
mod subscription;

pub use broker::{ChangeBroker, SharedChangeBroker, DEFAULT_CHANNEL_CAPACITY};
pub use error::Error;
pub use predicate::RowPredicate;
pub use subscription::SubscriptionEntry;

pub use rowstream_proto::ChangeEvent;
