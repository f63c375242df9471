//! Events emitted by a live transport connection.
//!
//! Every open connection feeds one ordered stream of these events to its
//! supervisor; the supervisor drives the session state machine from them and
//! nothing else.

use serde::{Deserialize, Serialize};

use crate::types::{AuthState, InboundMessage};

/// Why a connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Connection ended normally.
    Closed,
    /// The account was logged out remotely; the stored credentials are no
    /// longer valid.
    LoggedOut,
    /// The protocol demands an immediate reopen to carry on (e.g. after
    /// pairing completes).
    RestartRequired,
    /// Any other abnormal loss of the connection.
    ConnectionLost,
}

impl DisconnectReason {
    /// Logout invalidates credentials; there is nothing to reconnect with.
    pub fn is_logout(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }

    /// Whether the reconnect should skip the configured delay.
    pub fn wants_immediate_restart(&self) -> bool {
        matches!(self, DisconnectReason::RestartRequired)
    }
}

/// Typed event stream of one connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The credential blob changed; it must be durably persisted before the
    /// next event is acted on.
    CredentialsChanged { auth: AuthState },
    /// The account is not paired; `code` has to be presented to the user as
    /// a scannable artifact.
    PairingRequired { code: String },
    /// The connection reached the open state.
    Connected,
    /// The connection closed.
    Disconnected { reason: DisconnectReason },
    /// An inbound message arrived.
    MessageReceived { message: InboundMessage },
}
