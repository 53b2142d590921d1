//! Rowstream protocol types.
//!
//! This crate defines the shared data model for rowstream: row-level
//! change events and the subscription specs used to request them.
//!
//! # Modules
//!
//! - [`event`] - Change events delivered to subscribers
//! - [`subscription`] - Subscription specs and channel naming
//! - [`error`] - Protocol error types
//!
//! Row payloads are loosely typed JSON objects ([`Record`]); consumers
//! that want a concrete row shape deserialize them at the edge.

pub mod error;
pub mod event;
pub mod subscription;

pub use error::Error;
pub use event::{ChangeEvent, ChangeKind, Record};
pub use subscription::SubscriptionSpec;
