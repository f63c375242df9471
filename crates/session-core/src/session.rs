//! Per-session handle and state machine.
//!
//! A [`SessionHandle`] is the shared record for one account session: current
//! lifecycle state, the live transport (when connected), the reconnect
//! budget, and the coalescing cell that parks callers while the first
//! connection attempt is in flight.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use rmsg_transport::{
    AuthVariant, GroupMetadata, Jid, MessageContent, SessionId, Transport, TransportError,
};

use crate::errors::{Result, SessionError};
use crate::retry::RetryBudget;

/// Lifecycle states of a session.
///
/// ```text
/// Initializing -> AwaitingPairing -> Open
///       |                             |
///       +------- Reconnecting <-------+
///                      |
///              Closing -> Terminated
/// ```
///
/// `Closing` and `Terminated` are one-way: teardown never rolls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connection attempt in flight, nothing established yet.
    Initializing,
    /// A pairing artifact was issued; waiting for the device to scan it.
    AwaitingPairing,
    /// Connected and ready for operations.
    Open,
    /// Connection lost; a reconnect attempt is pending or in flight.
    Reconnecting,
    /// Teardown in progress.
    Closing,
    /// Fully torn down; the handle is no longer in the registry.
    Terminated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Pairing material handed to exactly one caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairingArtifact {
    /// Raw pairing string from the transport.
    pub code: String,
    /// The same string rendered as a scannable QR image (SVG data URL).
    pub qr: String,
}

/// Parked callers for an in-flight creation.
///
/// The first caller (the originator) holds the `artifact` receiver and is
/// the only one who can be handed pairing material. Everyone else lands in
/// `waiters` and just learns whether the session came up.
pub(crate) struct CreationCell {
    pub(crate) artifact: Option<oneshot::Sender<PairingArtifact>>,
    pub(crate) waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl CreationCell {
    /// Resolve every parked caller with success. Dropping the artifact
    /// sender tells the originator to fall through to the outcome channel.
    pub(crate) fn succeed(self) {
        for waiter in self.waiters {
            let _ = waiter.send(Ok(()));
        }
    }

    /// Resolve every parked caller with a freshly built error.
    pub(crate) fn fail_with(self, make_error: impl Fn() -> SessionError) {
        for waiter in self.waiters {
            let _ = waiter.send(Err(make_error()));
        }
    }
}

/// Shared record for one live session.
pub struct SessionHandle {
    pub id: SessionId,
    pub variant: AuthVariant,
    /// Instance number for this id; stale timer fires from an earlier
    /// instance compare epochs and bail out.
    pub(crate) epoch: u64,
    state: RwLock<SessionState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    pub(crate) retries: RetryBudget,
    pub(crate) creation: Mutex<Option<CreationCell>>,
    pub(crate) idle_task: Mutex<Option<JoinHandle<()>>>,
    pub(crate) supervisor_task: Mutex<Option<JoinHandle<()>>>,
    pub(crate) teardown_started: AtomicBool,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("variant", &self.variant)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        variant: AuthVariant,
        epoch: u64,
        max_retries: u32,
        cell: CreationCell,
    ) -> Self {
        Self {
            id,
            variant,
            epoch,
            state: RwLock::new(SessionState::Initializing),
            transport: RwLock::new(None),
            retries: RetryBudget::new(max_retries),
            creation: Mutex::new(Some(cell)),
            idle_task: Mutex::new(None),
            supervisor_task: Mutex::new(None),
            teardown_started: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Reconnect attempts consumed in the current disruption streak.
    pub fn reconnect_attempts(&self) -> u32 {
        self.retries.attempts()
    }

    pub(crate) async fn set_state(&self, new_state: SessionState) {
        let mut state = self.state.write().await;
        if *state != new_state {
            debug!("Session {} state: {:?} -> {:?}", self.id, *state, new_state);
            *state = new_state;
        }
    }

    pub(crate) async fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().await.clone()
    }

    pub(crate) async fn set_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write().await = Some(transport);
    }

    pub(crate) async fn clear_transport(&self) {
        *self.transport.write().await = None;
    }

    /// Register interest in the in-flight creation, if one exists.
    pub(crate) async fn join_creation(&self) -> Option<oneshot::Receiver<Result<()>>> {
        let mut cell = self.creation.lock().await;
        cell.as_mut().map(|cell| {
            let (tx, rx) = oneshot::channel();
            cell.waiters.push(tx);
            rx
        })
    }

    /// Take the whole creation cell for resolution.
    pub(crate) async fn take_creation(&self) -> Option<CreationCell> {
        self.creation.lock().await.take()
    }

    /// Take the one-shot artifact sender, leaving any waiters parked.
    pub(crate) async fn take_artifact_sender(&self) -> Option<oneshot::Sender<PairingArtifact>> {
        let mut cell = self.creation.lock().await;
        cell.as_mut().and_then(|cell| cell.artifact.take())
    }

    fn live_transport(
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<Arc<dyn Transport>> {
        transport.ok_or(SessionError::Transport(TransportError::NotConnected))
    }

    /// Send a message after the configured per-send settle delay.
    pub async fn send_message(
        &self,
        to: &Jid,
        content: MessageContent,
        delay: Duration,
    ) -> Result<String> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let transport = Self::live_transport(self.transport().await)?;
        Ok(transport.send_message(to, content).await?)
    }

    /// Whether the recipient exists on the network.
    pub async fn exists(&self, jid: &Jid) -> Result<bool> {
        let transport = Self::live_transport(self.transport().await)?;
        Ok(transport.exists(jid).await?)
    }

    pub async fn group_metadata(&self, jid: &Jid) -> Result<GroupMetadata> {
        let transport = Self::live_transport(self.transport().await)?;
        Ok(transport.group_metadata(jid).await?)
    }

    pub async fn all_groups(&self) -> Result<Vec<GroupMetadata>> {
        let transport = Self::live_transport(self.transport().await)?;
        Ok(transport.all_groups().await?)
    }
}
