//! The transport capability seam.
//!
//! The session layer supervises connections through these two traits and
//! nothing else; swapping the protocol implementation must never touch the
//! lifecycle code.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportResult;
use crate::events::TransportEvent;
use crate::types::{AuthState, GroupMetadata, Jid, MessageContent, SessionId};

/// Operations available on one live connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to a direct peer or a group. Returns the protocol
    /// message id.
    async fn send_message(&self, to: &Jid, content: MessageContent) -> TransportResult<String>;

    /// Fetch metadata of one group.
    async fn group_metadata(&self, jid: &Jid) -> TransportResult<GroupMetadata>;

    /// Fetch all groups this account participates in.
    async fn all_groups(&self) -> TransportResult<Vec<GroupMetadata>>;

    /// Whether `jid` is reachable on the network (registered number or
    /// existing group).
    async fn exists(&self, jid: &Jid) -> TransportResult<bool>;

    /// Invalidate this account's pairing server-side. The stored credentials
    /// are dead afterwards.
    async fn logout(&self) -> TransportResult<()>;

    /// Close the connection locally without touching the pairing.
    async fn close(&self) -> TransportResult<()>;
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Transport")
    }
}

/// Opens connections from credential blobs.
///
/// `open` hands back the operations handle together with the ordered event
/// stream of that connection. The first event is either
/// [`TransportEvent::Connected`] (usable identity) or
/// [`TransportEvent::PairingRequired`] (blob lacks one); the caller owns the
/// receiver and must drain it promptly.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(
        &self,
        id: &SessionId,
        auth: AuthState,
    ) -> TransportResult<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)>;
}
