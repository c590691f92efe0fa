//! Error types for relay-link.

use crate::models::RemoteError;
use thiserror::Error;

/// Errors surfaced by the subscription client.
///
/// Stream errors carry the transport's [`RemoteError`] payload unchanged so
/// callers can match on its `code`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayLinkError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The start or stop control call could not be issued.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The transport refused to start the subscription.
    #[error("Subscription rejected: {0}")]
    SubscribeRejected(RemoteError),

    /// An error event arrived on the stream.
    #[error("Stream error: {0}")]
    StreamError(RemoteError),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RelayLinkError {
    /// The remote payload, for errors that originated at the transport.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            RelayLinkError::SubscribeRejected(err) | RelayLinkError::StreamError(err) => Some(err),
            _ => None,
        }
    }

    /// Remote error code, if any.
    pub fn code(&self) -> Option<&str> {
        self.remote().map(|err| err.code.as_str())
    }
}

impl From<serde_json::Error> for RelayLinkError {
    fn from(err: serde_json::Error) -> Self {
        RelayLinkError::SerializationError(err.to_string())
    }
}

/// Result type for relay-link operations.
pub type Result<T> = std::result::Result<T, RelayLinkError>;
