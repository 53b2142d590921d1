//! Protocol error types.

use thiserror::Error;

/// Protocol errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A subscription spec named an empty resource.
    #[error("subscription resource name must not be empty")]
    EmptyResource,

    /// A change event payload did not match its change kind.
    #[error("invalid change payload: {0}")]
    InvalidPayload(String),
}
