//! Session lifecycle manager.
//!
//! Owns the registry, the credential store and the transport factory, and
//! exposes the operations the gateway calls: create-or-join, acquire for
//! messaging, status, removal, startup rehydration and shutdown.
//!
//! Creation is coalesced: the first caller for an id becomes the originator
//! and may receive the pairing artifact; everyone who arrives while that
//! attempt is in flight is parked on the same cell and woken with the
//! outcome. At most one live session per id ever exists because the handle
//! is inserted into the registry before the first await point of the
//! connection attempt.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use rmsg_transport::{AuthVariant, SessionId, TransportFactory};

use crate::config::SessionConfig;
use crate::errors::{Result, SessionError};
use crate::forward::EventForwarder;
use crate::registry::{RegistryStats, SessionRegistry};
use crate::session::{CreationCell, PairingArtifact, SessionHandle, SessionState};
use crate::store::CredentialStore;
use crate::supervisor;

/// What a creation call resolved to.
#[derive(Debug)]
pub enum SessionAccess {
    /// The session is connected and ready for operations.
    Ready,
    /// The session needs pairing; this caller holds the one-shot artifact.
    Pairing(PairingArtifact),
}

/// How much of a session to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    /// Drop the live session but keep stored credentials for later revival.
    Evict,
    /// Remove the live session, log out and delete stored credentials.
    Delete,
}

/// Which component initiated a teardown. A teardown running on the
/// supervisor task must not abort it, so the origin is threaded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TeardownFrom {
    Api,
    IdleTimer,
    Supervisor,
}

/// Coordinates every live session.
pub struct SessionManager {
    config: SessionConfig,
    store: Arc<CredentialStore>,
    factory: Arc<dyn TransportFactory>,
    registry: SessionRegistry,
    forwarder: Option<Arc<EventForwarder>>,
    epoch_seq: AtomicU64,
    closed: AtomicBool,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        store: Arc<CredentialStore>,
        factory: Arc<dyn TransportFactory>,
    ) -> Arc<Self> {
        let forwarder = config
            .webhook_url
            .as_ref()
            .map(|url| Arc::new(EventForwarder::new(url.clone(), config.webhook_secret.clone())));
        Arc::new(Self {
            config,
            store,
            factory,
            registry: SessionRegistry::new(),
            forwarder,
            epoch_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub(crate) fn factory(&self) -> &Arc<dyn TransportFactory> {
        &self.factory
    }

    pub(crate) fn forwarder(&self) -> Option<&Arc<EventForwarder>> {
        self.forwarder.as_ref()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::ShuttingDown);
        }
        Ok(())
    }

    /// Get the session for `id`, creating it if absent.
    ///
    /// Suspends until the attempt resolves: `Ready` once connected,
    /// `Pairing` when the account needs to scan an artifact first. A stored
    /// credential blob overrides `requested` so revival keeps its variant.
    pub async fn get_or_create(
        self: &Arc<Self>,
        id: &SessionId,
        requested: AuthVariant,
    ) -> Result<SessionAccess> {
        self.ensure_running()?;
        loop {
            if let Some(handle) = self.registry.get(id).await {
                match handle.state().await {
                    SessionState::Open => {
                        self.arm_idle(&handle).await;
                        return Ok(SessionAccess::Ready);
                    }
                    SessionState::AwaitingPairing => {
                        return Err(SessionError::pairing_pending(id));
                    }
                    SessionState::Closing | SessionState::Terminated => {
                        // Teardown is about to drop this handle; retry once
                        // it has left the registry.
                        tokio::task::yield_now().await;
                        continue;
                    }
                    SessionState::Initializing | SessionState::Reconnecting => {
                        let Some(outcome) = handle.join_creation().await else {
                            // No creation in flight. Only a session that
                            // already established counts; anything else is a
                            // transient supervisor or teardown window, so
                            // re-read and go around.
                            match handle.state().await {
                                SessionState::Reconnecting => {
                                    return Ok(SessionAccess::Ready);
                                }
                                _ => {
                                    tokio::task::yield_now().await;
                                    continue;
                                }
                            }
                        };
                        return match outcome.await {
                            Ok(Ok(())) => Ok(SessionAccess::Ready),
                            Ok(Err(e)) => Err(e),
                            Err(_) => Err(SessionError::creation_failed(id)),
                        };
                    }
                }
            }

            // Miss: try to become the originator of a fresh attempt.
            let variant = self.store.variant_of(id).await.unwrap_or(requested);
            let (artifact_tx, artifact_rx) = oneshot::channel();
            let (outcome_tx, outcome_rx) = oneshot::channel();
            if !self.start_creation(id, variant, Some(artifact_tx), vec![outcome_tx]).await {
                // Lost the insert race; join whoever won.
                continue;
            }

            // The artifact channel resolves first when pairing is needed.
            // When it is dropped instead, the outcome channel carries the
            // connection result.
            return match artifact_rx.await {
                Ok(artifact) => Ok(SessionAccess::Pairing(artifact)),
                Err(_) => match outcome_rx.await {
                    Ok(Ok(())) => Ok(SessionAccess::Ready),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(SessionError::creation_failed(id)),
                },
            };
        }
    }

    /// Get an operational session for `id` without ever minting a pairing.
    ///
    /// Revives an evicted session from stored credentials, suspending until
    /// it is connected. Fails with `NotFound` when neither a live session
    /// nor credentials exist, and with `PairingPending` when the session is
    /// still waiting for its artifact to be scanned.
    pub async fn acquire(self: &Arc<Self>, id: &SessionId) -> Result<Arc<SessionHandle>> {
        self.ensure_running()?;
        loop {
            if let Some(handle) = self.registry.get(id).await {
                match handle.state().await {
                    SessionState::Open => {
                        self.arm_idle(&handle).await;
                        return Ok(handle);
                    }
                    SessionState::AwaitingPairing => {
                        return Err(SessionError::pairing_pending(id));
                    }
                    SessionState::Closing | SessionState::Terminated => {
                        tokio::task::yield_now().await;
                        continue;
                    }
                    SessionState::Initializing | SessionState::Reconnecting => {
                        let Some(outcome) = handle.join_creation().await else {
                            match handle.state().await {
                                SessionState::Reconnecting => {
                                    // Mid-reconnect: hand out the handle,
                                    // operations fail fast while the
                                    // transport is down.
                                    return Ok(handle);
                                }
                                _ => {
                                    tokio::task::yield_now().await;
                                    continue;
                                }
                            }
                        };
                        match outcome.await {
                            Ok(Ok(())) => continue,
                            Ok(Err(e)) => return Err(e),
                            Err(_) => return Err(SessionError::creation_failed(id)),
                        }
                    }
                }
            }

            // Miss: only credentials on disk justify a revival here.
            let Some(variant) = self.store.variant_of(id).await else {
                return Err(SessionError::not_found(id));
            };
            debug!(session = %id, "reviving session from stored credentials");
            let (outcome_tx, outcome_rx) = oneshot::channel();
            if !self.start_creation(id, variant, None, vec![outcome_tx]).await {
                continue;
            }
            match outcome_rx.await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(SessionError::creation_failed(id)),
            }
        }
    }

    /// Current lifecycle state, `None` when no live session exists.
    pub async fn state(&self, id: &SessionId) -> Option<SessionState> {
        let handle = self.registry.get(id).await?;
        Some(handle.state().await)
    }

    /// Ids and states of every live session.
    pub async fn list(&self) -> Vec<(SessionId, SessionState)> {
        let mut out = Vec::new();
        for id in self.registry.ids().await {
            if let Some(handle) = self.registry.get(&id).await {
                out.push((id, handle.state().await));
            }
        }
        out
    }

    pub async fn registry_stats(&self) -> RegistryStats {
        self.registry.stats().await
    }

    /// Tear down the session for `id`. `Evict` keeps credentials on disk,
    /// `Delete` logs the account out and purges them.
    pub async fn remove(&self, id: &SessionId, mode: RemoveMode) -> Result<()> {
        self.remove_with(id, mode, TeardownFrom::Api, None).await
    }

    /// Teardown entry point shared by the API, idle timers and supervisors.
    ///
    /// `expected_epoch` makes stale timer fires harmless: a timer armed for
    /// an earlier incarnation of this id refuses to touch its successor.
    pub(crate) async fn remove_with(
        &self,
        id: &SessionId,
        mode: RemoveMode,
        from: TeardownFrom,
        expected_epoch: Option<u64>,
    ) -> Result<()> {
        let Some(handle) = self.registry.get(id).await else {
            return Err(SessionError::not_found(id));
        };
        if let Some(epoch) = expected_epoch {
            if handle.epoch != epoch {
                debug!(session = %id, "stale teardown ignored");
                return Ok(());
            }
        }
        if handle.teardown_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        handle.set_state(SessionState::Closing).await;

        // Cancel companion tasks first so nothing re-arms or reconnects
        // mid-teardown. The idle slot only ever holds the deadline sleep,
        // so it is safe to abort from any origin; the supervisor task is
        // left alone when the teardown runs on it.
        if let Some(task) = handle.idle_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = handle.supervisor_task.lock().await.take() {
            if from != TeardownFrom::Supervisor {
                task.abort();
            }
        }

        // Anyone still parked on creation learns the session is gone.
        if let Some(cell) = handle.take_creation().await {
            cell.fail_with(|| SessionError::creation_failed(id));
        }

        if let Some(transport) = handle.transport().await {
            if mode == RemoveMode::Delete {
                if let Err(e) = transport.logout().await {
                    debug!(session = %id, error = %e, "logout failed during removal");
                }
            }
            if let Err(e) = transport.close().await {
                debug!(session = %id, error = %e, "close failed during removal");
            }
        }
        handle.clear_transport().await;

        self.registry.remove(id).await;
        if mode == RemoveMode::Delete {
            if let Err(e) = self.store.delete(id, handle.variant).await {
                warn!(session = %id, error = %e, "failed to delete stored credentials");
            }
        }
        handle.set_state(SessionState::Terminated).await;

        match mode {
            RemoveMode::Evict => info!(session = %id, "session evicted"),
            RemoveMode::Delete => info!(session = %id, "session deleted"),
        }
        Ok(())
    }

    /// (Re)start the idle eviction timer for a session. Every successful
    /// access lands here, so activity keeps pushing eviction out.
    pub(crate) async fn arm_idle(self: &Arc<Self>, handle: &Arc<SessionHandle>) {
        let mut slot = handle.idle_task.lock().await;
        if handle.teardown_started.load(Ordering::SeqCst) {
            return;
        }
        if let Some(old) = slot.take() {
            old.abort();
        }

        let manager = Arc::clone(self);
        let id = handle.id.clone();
        let epoch = handle.epoch;
        let timeout = self.config.idle_timeout;
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!(session = %id, "idle timeout reached");
            // Detached so a rearm abort can only ever cancel the sleep,
            // never an eviction that is already past its deadline.
            tokio::spawn(async move {
                if let Err(e) = manager
                    .remove_with(&id, RemoveMode::Evict, TeardownFrom::IdleTimer, Some(epoch))
                    .await
                {
                    debug!(session = %id, error = %e, "idle eviction skipped");
                }
            });
        }));
    }

    /// Revive every restorable credential blob found on disk. Called once
    /// at startup; returns how many sessions were spawned.
    pub async fn restore_persisted(self: &Arc<Self>) -> Result<usize> {
        self.ensure_running()?;
        self.store.ensure_dir().await?;
        let entries = self.store.entries().await?;
        let mut restored = 0;
        for entry in entries {
            if self.start_creation(&entry.id, entry.variant, None, Vec::new()).await {
                restored += 1;
            }
        }
        info!(restored, "restored persisted sessions");
        Ok(restored)
    }

    /// Stop accepting work and tear down every live session, keeping
    /// credentials so the next start can rehydrate.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("session manager shutting down");
        for id in self.registry.ids().await {
            if let Err(e) = self.remove_with(&id, RemoveMode::Evict, TeardownFrom::Api, None).await {
                debug!(session = %id, error = %e, "shutdown teardown skipped");
            }
        }
    }

    /// Insert a fresh handle and spawn its supervisor. Returns `false` when
    /// a handle for this id already exists.
    async fn start_creation(
        self: &Arc<Self>,
        id: &SessionId,
        variant: AuthVariant,
        artifact: Option<oneshot::Sender<PairingArtifact>>,
        waiters: Vec<oneshot::Sender<Result<()>>>,
    ) -> bool {
        let epoch = self.epoch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = Arc::new(SessionHandle::new(
            id.clone(),
            variant,
            epoch,
            self.config.max_retries,
            CreationCell { artifact, waiters },
        ));
        let (handle, inserted) = self.registry.insert_if_absent(handle).await;
        if !inserted {
            return false;
        }
        let task = supervisor::spawn(Arc::clone(self), Arc::clone(&handle));
        *handle.supervisor_task.lock().await = Some(task);
        true
    }
}
