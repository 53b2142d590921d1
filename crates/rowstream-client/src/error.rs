//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not open a channel.
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Proto(#[from] rowstream_proto::Error),

    /// Broker error.
    #[error("broker error: {0}")]
    Broker(#[from] rowstream_broker::Error),

    /// The subscribe handshake timed out.
    #[error("subscribe handshake timed out")]
    Timeout,
}
