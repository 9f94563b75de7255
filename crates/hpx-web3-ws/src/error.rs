//! Error handling for the websocket provider.
//!
//! Errors fall into the categories described by [`ErrorCategory`]. Input and
//! node errors fail a single call, processing errors are reported through the
//! [`ConnectionDelegate`](crate::delegate::ConnectionDelegate) and never close
//! the connection, and connection errors fail every pending request.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// The main result type used throughout the provider.
pub type TransportResult<T> = Result<T, TransportError>;

/// Coarse classification of a [`TransportError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller misuse, surfaced synchronously.
    Input,
    /// The socket dropped or could not be used.
    Connection,
    /// A malformed or unexpected inbound payload.
    Processing,
    /// The node answered a request with an explicit error object.
    Node,
    /// An operation did not complete in time.
    Timeout,
}

/// Comprehensive error type for all provider operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Invalid caller input (bad parameters, unsupported call shape).
    #[error("Input error: {message}")]
    Input { message: String },

    /// The requested JSON-RPC method cannot be sent over this provider.
    #[error("Unsupported method: {method}")]
    UnsupportedOperation { method: String },

    /// Configuration errors, including malformed endpoints.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The connection was lost while the operation was outstanding.
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// Socket level failure reported by the transport adapter.
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    /// A malformed or unexpected inbound payload.
    #[error("Processing error: {message}")]
    Processing { message: String },

    /// Binary frames are not part of the protocol.
    #[error("Unsupported data type: binary frame of {len} bytes")]
    UnsupportedDataType { len: usize },

    /// A server-initiated message the provider does not route anywhere.
    #[error("Unhandled message: {raw}")]
    UnhandledMessage { raw: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The node returned an error object for a request.
    #[error("Node error: {error}")]
    Node { error: Value },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket {
            message: e.to_string(),
        }
    }
}

impl TransportError {
    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error for `method`.
    pub fn unsupported_operation(method: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            method: method.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Create a WebSocket error.
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Create a processing error.
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Create a node error from the `error` member of a response.
    pub fn node(error: Value) -> Self {
        Self::Node { error }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Input { .. } | Self::UnsupportedOperation { .. } | Self::Config { .. } => {
                ErrorCategory::Input
            }
            Self::ConnectionLost { .. } | Self::WebSocket { .. } | Self::Internal { .. } => {
                ErrorCategory::Connection
            }
            Self::Processing { .. }
            | Self::UnsupportedDataType { .. }
            | Self::UnhandledMessage { .. }
            | Self::Serialization(_) => ErrorCategory::Processing,
            Self::Node { .. } => ErrorCategory::Node,
            Self::Timeout { .. } => ErrorCategory::Timeout,
        }
    }

    /// Returns true if this error means the connection went away.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TransportError::config("Invalid URL");
        assert!(matches!(err, TransportError::Config { .. }));

        let err = TransportError::timeout(Duration::from_secs(5));
        assert!(matches!(err, TransportError::Timeout { .. }));

        let err = TransportError::connection_lost("socket closed");
        assert!(err.is_connection_lost());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            TransportError::unsupported_operation("eth_call").category(),
            ErrorCategory::Input
        );
        assert_eq!(
            TransportError::connection_lost("gone").category(),
            ErrorCategory::Connection
        );
        assert_eq!(
            TransportError::UnsupportedDataType { len: 4 }.category(),
            ErrorCategory::Processing
        );
        assert_eq!(
            TransportError::node(serde_json::json!({"code": -32000})).category(),
            ErrorCategory::Node
        );
    }

    #[test]
    fn test_node_error_display_includes_payload() {
        let err = TransportError::node(serde_json::json!({"code": -32601, "message": "nope"}));
        let text = err.to_string();
        assert!(text.contains("-32601"));
        assert!(text.contains("nope"));
    }
}
