//! Error types for session lifecycle management.

use rmsg_transport::TransportError;
use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors raised while creating, using or tearing down sessions.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No live session and no stored credentials for this id
    #[error("Session not found: {id}")]
    NotFound { id: String },

    /// A live session with this id already exists
    #[error("Session already exists: {id}")]
    AlreadyExists { id: String },

    /// The session could not be brought up
    #[error("Session creation failed: {id}")]
    CreationFailed { id: String },

    /// The session is waiting for its pairing artifact to be scanned
    #[error("Session is awaiting pairing: {id}")]
    PairingPending { id: String },

    /// The manager is shutting down and refuses new work
    #[error("Session manager is shutting down")]
    ShuttingDown,

    /// Pairing artifact could not be rendered
    #[error("Pairing artifact error: {message}")]
    Artifact { message: String },

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credential store I/O error
    #[error("Credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential blob serialization error
    #[error("Credential serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SessionError {
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    pub fn already_exists(id: impl std::fmt::Display) -> Self {
        Self::AlreadyExists { id: id.to_string() }
    }

    pub fn creation_failed(id: impl std::fmt::Display) -> Self {
        Self::CreationFailed { id: id.to_string() }
    }

    pub fn pairing_pending(id: impl std::fmt::Display) -> Self {
        Self::PairingPending { id: id.to_string() }
    }

    pub fn artifact(message: impl Into<String>) -> Self {
        Self::Artifact { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}
