//! Error types for the transport layer

use thiserror::Error;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors a transport can surface to the session layer
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the connection failed before any event was emitted
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    /// An operation was attempted while the connection is not open
    #[error("Transport is not connected")]
    NotConnected,

    /// The addressed group does not exist or is not joined
    #[error("Group not found: {jid}")]
    GroupNotFound { jid: String },

    /// Sending a message failed
    #[error("Send failed: {message}")]
    SendFailed { message: String },

    /// Any other protocol-level error
    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl TransportError {
    /// Create a connection failure error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create a group-not-found error
    pub fn group_not_found(jid: impl Into<String>) -> Self {
        Self::GroupNotFound { jid: jid.into() }
    }

    /// Create a send failure error
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::SendFailed {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}
