//! # RMSG Transport
//!
//! Transport capability layer for the rmsg gateway.
//!
//! This crate defines the boundary between the session lifecycle manager and
//! the underlying real-time messaging protocol:
//!
//! - Addressing and content types ([`SessionId`], [`Jid`], [`MessageContent`])
//! - The persisted credential blob ([`AuthState`]) and its variant flag
//! - The event set a live connection emits ([`TransportEvent`])
//! - The [`Transport`] / [`TransportFactory`] traits the session layer
//!   consumes
//! - A deterministic in-memory implementation
//!   ([`memory::MemoryTransportFactory`]) used by tests and demos
//!
//! The session layer never sees protocol wire details; it opens a transport
//! with a credential blob and reacts to the typed event stream.

pub mod error;
pub mod events;
pub mod memory;
pub mod transport;
pub mod types;

pub use error::{TransportError, TransportResult};
pub use events::{DisconnectReason, TransportEvent};
pub use memory::{MemoryTransportFactory, SentMessage};
pub use transport::{Transport, TransportFactory};
pub use types::{
    AuthState, AuthVariant, GroupMetadata, GroupParticipant, InboundMessage, Jid, MessageContent,
    MessageKind, SessionId,
};
