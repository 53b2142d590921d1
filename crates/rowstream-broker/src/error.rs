//! Broker error types.

use thiserror::Error;

/// Broker errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol error.
    #[error("protocol error: {0}")]
    Proto(#[from] rowstream_proto::Error),

    /// A predicate string could not be interpreted.
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    /// An operation referenced a subscription that does not exist.
    #[error("subscription {0} not found")]
    UnknownSubscription(u64),
}
