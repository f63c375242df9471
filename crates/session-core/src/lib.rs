//! # RMSG Session Core
//!
//! Lifecycle management for many concurrent messaging sessions: a keyed
//! registry with coalesced creation, a per-session connection supervisor
//! with a flat reconnect budget, idle eviction timers, an on-disk
//! credential store with startup rehydration, and webhook forwarding of
//! inbound messages.
//!
//! The transport protocol itself lives behind the traits in
//! [`rmsg_transport`]; this crate only supervises connections, it never
//! speaks the wire protocol.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rmsg_session_core::{CredentialStore, SessionConfig, SessionManager};
//! use rmsg_transport::{AuthVariant, MemoryTransportFactory, SessionId};
//!
//! # async fn demo() -> rmsg_session_core::Result<()> {
//! let config = SessionConfig::from_env();
//! let store = Arc::new(CredentialStore::new(config.sessions_dir.clone()));
//! let manager = SessionManager::new(config, store, Arc::new(MemoryTransportFactory::new()));
//!
//! manager.restore_persisted().await?;
//! manager.get_or_create(&SessionId::new("alpha"), AuthVariant::Modern).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod forward;
pub mod manager;
pub mod registry;
pub mod retry;
pub mod session;
pub mod store;

mod supervisor;

pub use config::SessionConfig;
pub use errors::{Result, SessionError};
pub use forward::{EventForwarder, InboundNotification};
pub use manager::{RemoveMode, SessionAccess, SessionManager};
pub use registry::{RegistryStats, SessionRegistry};
pub use retry::RetryBudget;
pub use session::{PairingArtifact, SessionHandle, SessionState};
pub use store::{CredentialStore, StoreEntry};
