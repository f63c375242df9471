//! # RMSG Gateway
//!
//! REST front door over [`rmsg_session_core`]: session lifecycle endpoints
//! (create with pairing, status, delete), direct and group messaging, all
//! answered in one `{success, message, data}` envelope.
//!
//! The library half exists so integration tests can assemble the router
//! against an in-memory transport; the binary in `main.rs` wires the same
//! router to a TCP listener.

pub mod api;
pub mod config;
pub mod response;

pub use api::{router, AppState};
pub use config::GatewayConfig;
