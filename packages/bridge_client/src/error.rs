//! Client-side error taxonomy. Distinct from the server's `ErrorCode` (spec
//! §7) because the client also has to represent transport and transport
//! -switch failures that never cross the wire.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("no transport available: {0}")]
    NoTransport(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("command timed out")]
    CommandTimeout,

    #[error("server error {code}: {message}")]
    Server { code: String, message: String },

    #[error("malformed envelope: {0}")]
    Malformed(String),
}
