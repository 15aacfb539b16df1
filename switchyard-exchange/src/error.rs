//! Error types for the exchange layer.
//!
//! Request outcomes that callers are expected to branch on (timeout, channel
//! closed while waiting) are [`crate::Status`] values on the response, not
//! errors. The types here cover establishment failures, misuse of a closed
//! channel and transport hand-off failures.

use switchyard_core::{ExtensionError, UrlParseError};

/// Errors that can occur in the exchange layer.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// A listening endpoint could not be established.
    #[error("failed to bind {url}: {source}")]
    Bind {
        /// The url that was being bound.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// An outbound channel could not be established.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// The url that was being connected to.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The channel is closing or closed and accepts no further sends.
    #[error("channel closed")]
    ChannelClosed,

    /// The transport refused to take a message.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A response arrived for an id with no pending request.
    #[error("unmatched response for request {id}")]
    UnmatchedResponse {
        /// The response id.
        id: u64,
    },

    /// Exchanger or transporter selection failed.
    #[error("extension error: {0}")]
    Extension(#[from] ExtensionError),

    /// A url could not be parsed.
    #[error("invalid url: {0}")]
    Url(#[from] UrlParseError),
}

/// Errors reported by transport collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport is closed.
    #[error("transport closed")]
    Closed,

    /// The outbound queue is full.
    #[error("queue full: capacity {capacity}")]
    QueueFull {
        /// Maximum capacity of the queue.
        capacity: usize,
    },

    /// Something is already listening on the address.
    #[error("address in use: {address}")]
    AddressInUse {
        /// The contested address.
        address: String,
    },

    /// Nothing is listening on the address.
    #[error("connection refused: {address}")]
    ConnectionRefused {
        /// The unreachable address.
        address: String,
    },

    /// The url carries no usable address.
    #[error("invalid address in {url}")]
    InvalidAddress {
        /// The offending url.
        url: String,
    },
}

/// Failure reported by an application handler while producing a reply.
///
/// Converted by the channel into a [`crate::Status::Error`] response whose
/// payload is the error message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_exchange_error_display() {
        let err = ExchangeError::Bind {
            url: "memory://a:1".to_string(),
            source: TransportError::AddressInUse {
                address: "a:1".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "failed to bind memory://a:1: address in use: a:1"
        );
        assert!(err.source().is_some());

        assert_eq!(
            ExchangeError::UnmatchedResponse { id: 7 }.to_string(),
            "unmatched response for request 7"
        );
    }

    #[test]
    fn test_exchange_error_from_transport() {
        let err: ExchangeError = TransportError::Closed.into();
        assert!(matches!(err, ExchangeError::Transport(TransportError::Closed)));
    }

    #[test]
    fn test_handler_error_message() {
        let err = HandlerError::from("no such method");
        assert_eq!(err.message(), "no such method");
        assert_eq!(err.to_string(), "no such method");
    }
}
