//! Deterministic in-memory transport.
//!
//! Stands in for the real protocol stack in tests and demos. Connections are
//! plain channels; the factory exposes a control surface to script pairing,
//! disconnects and inbound traffic, and records everything a session sends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::events::{DisconnectReason, TransportEvent};
use crate::transport::{Transport, TransportFactory};
use crate::types::{AuthState, GroupMetadata, Jid, MessageContent, SessionId};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One message captured by [`MemoryTransport::send_message`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub session: SessionId,
    pub to: Jid,
    pub content: MessageContent,
}

/// Live-connection bookkeeping, one per opened session.
struct SessionCtl {
    events: mpsc::Sender<TransportEvent>,
    connected: Arc<std::sync::atomic::AtomicBool>,
}

#[derive(Default)]
struct FactoryState {
    sessions: HashMap<SessionId, SessionCtl>,
    /// Remaining scripted open failures per session.
    failing_opens: HashMap<SessionId, u32>,
    /// Existence overrides; anything absent is treated as reachable.
    exists: HashMap<String, bool>,
    /// Group fixtures per session.
    groups: HashMap<SessionId, Vec<GroupMetadata>>,
    /// Total successful opens per session.
    opens: HashMap<SessionId, u64>,
}

struct FactoryInner {
    state: RwLock<FactoryState>,
    sent: Mutex<Vec<SentMessage>>,
    open_seq: AtomicU64,
    holding: std::sync::atomic::AtomicBool,
    release: Notify,
}

/// Factory producing in-memory connections.
///
/// Clones share all state, so a test can keep one handle for scripting while
/// the session layer owns another.
#[derive(Clone)]
pub struct MemoryTransportFactory {
    inner: Arc<FactoryInner>,
}

impl MemoryTransportFactory {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                state: RwLock::new(FactoryState::default()),
                sent: Mutex::new(Vec::new()),
                open_seq: AtomicU64::new(0),
                holding: std::sync::atomic::AtomicBool::new(false),
                release: Notify::new(),
            }),
        }
    }

    /// Park every `open` call until [`release_opens`](Self::release_opens).
    pub fn hold_opens(&self) {
        self.inner.holding.store(true, Ordering::SeqCst);
    }

    /// Let held and future `open` calls proceed.
    pub fn release_opens(&self) {
        self.inner.holding.store(false, Ordering::SeqCst);
        self.inner.release.notify_waiters();
    }

    /// Make the next `n` opens for `id` fail with a connection error.
    pub async fn fail_opens(&self, id: &SessionId, n: u32) {
        let mut state = self.inner.state.write().await;
        state.failing_opens.insert(id.clone(), n);
    }

    /// Total successful opens across all sessions.
    pub fn total_opens(&self) -> u64 {
        self.inner.open_seq.load(Ordering::SeqCst)
    }

    /// Successful opens for one session.
    pub async fn opens_for(&self, id: &SessionId) -> u64 {
        self.inner
            .state
            .read()
            .await
            .opens
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the session currently holds an open connection.
    pub async fn is_connected(&self, id: &SessionId) -> bool {
        self.inner
            .state
            .read()
            .await
            .sessions
            .get(id)
            .map(|ctl| ctl.connected.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Simulate the user scanning the pairing artifact: the credentials gain
    /// a registered identity and the connection opens.
    pub async fn complete_pairing(&self, id: &SessionId) -> bool {
        let auth = AuthState::registered(&Jid::user(id.as_str()));
        let state = self.inner.state.read().await;
        let Some(ctl) = state.sessions.get(id) else {
            return false;
        };
        if ctl
            .events
            .send(TransportEvent::CredentialsChanged { auth })
            .await
            .is_err()
        {
            return false;
        }
        ctl.connected.store(true, Ordering::SeqCst);
        ctl.events.send(TransportEvent::Connected).await.is_ok()
    }

    /// Drop the connection with the given reason.
    pub async fn close_session(&self, id: &SessionId, reason: DisconnectReason) -> bool {
        let state = self.inner.state.read().await;
        let Some(ctl) = state.sessions.get(id) else {
            return false;
        };
        ctl.connected.store(false, Ordering::SeqCst);
        ctl.events
            .send(TransportEvent::Disconnected { reason })
            .await
            .is_ok()
    }

    /// Deliver an inbound message to the session's event stream.
    pub async fn inject_inbound(&self, id: &SessionId, message: crate::types::InboundMessage) -> bool {
        let state = self.inner.state.read().await;
        let Some(ctl) = state.sessions.get(id) else {
            return false;
        };
        ctl.events
            .send(TransportEvent::MessageReceived { message })
            .await
            .is_ok()
    }

    /// Override whether a jid is reachable (default: reachable).
    pub async fn set_exists(&self, jid: &Jid, exists: bool) {
        let mut state = self.inner.state.write().await;
        state.exists.insert(jid.as_str().to_string(), exists);
    }

    /// Install group fixtures for a session.
    pub async fn set_groups(&self, id: &SessionId, groups: Vec<GroupMetadata>) {
        let mut state = self.inner.state.write().await;
        state.groups.insert(id.clone(), groups);
    }

    /// Everything sent through any connection so far.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.inner.sent.lock().await.clone()
    }
}

#[async_trait]
impl TransportFactory for MemoryTransportFactory {
    async fn open(
        &self,
        id: &SessionId,
        auth: AuthState,
    ) -> TransportResult<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
        // Test gate: park until released so callers can race deterministically.
        loop {
            let released = self.inner.release.notified();
            if !self.inner.holding.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }

        {
            let mut state = self.inner.state.write().await;
            if let Some(remaining) = state.failing_opens.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    debug!(session = %id, "memory transport: scripted open failure");
                    return Err(TransportError::connection_failed("scripted failure"));
                }
            }
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let connected = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seq = self.inner.open_seq.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut state = self.inner.state.write().await;
            *state.opens.entry(id.clone()).or_insert(0) += 1;
            state.sessions.insert(
                id.clone(),
                SessionCtl {
                    events: tx.clone(),
                    connected: connected.clone(),
                },
            );
        }

        if auth.is_registered() {
            connected.store(true, Ordering::SeqCst);
            let _ = tx.send(TransportEvent::Connected).await;
            debug!(session = %id, "memory transport: opened with registered identity");
        } else {
            let code = format!("pair-{}-{}", id, seq);
            let _ = tx.send(TransportEvent::PairingRequired { code }).await;
            debug!(session = %id, "memory transport: pairing required");
        }

        let transport = MemoryTransport {
            id: id.clone(),
            inner: self.inner.clone(),
            connected,
        };
        Ok((Arc::new(transport), rx))
    }
}

/// One in-memory connection.
pub struct MemoryTransport {
    id: SessionId,
    inner: Arc<FactoryInner>,
    connected: Arc<std::sync::atomic::AtomicBool>,
}

impl MemoryTransport {
    fn ensure_connected(&self) -> TransportResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_message(&self, to: &Jid, content: MessageContent) -> TransportResult<String> {
        self.ensure_connected()?;
        let mut sent = self.inner.sent.lock().await;
        sent.push(SentMessage {
            session: self.id.clone(),
            to: to.clone(),
            content,
        });
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn group_metadata(&self, jid: &Jid) -> TransportResult<GroupMetadata> {
        self.ensure_connected()?;
        let state = self.inner.state.read().await;
        state
            .groups
            .get(&self.id)
            .and_then(|groups| groups.iter().find(|g| &g.id == jid))
            .cloned()
            .ok_or_else(|| TransportError::group_not_found(jid.as_str()))
    }

    async fn all_groups(&self) -> TransportResult<Vec<GroupMetadata>> {
        self.ensure_connected()?;
        let state = self.inner.state.read().await;
        Ok(state.groups.get(&self.id).cloned().unwrap_or_default())
    }

    async fn exists(&self, jid: &Jid) -> TransportResult<bool> {
        self.ensure_connected()?;
        let state = self.inner.state.read().await;
        if jid.is_group() {
            // Groups exist when this session knows them, mirroring a
            // metadata probe.
            let known = state
                .groups
                .get(&self.id)
                .map(|groups| groups.iter().any(|g| &g.id == jid))
                .unwrap_or(false);
            return Ok(known || state.exists.get(jid.as_str()).copied().unwrap_or(false));
        }
        Ok(state.exists.get(jid.as_str()).copied().unwrap_or(true))
    }

    async fn logout(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        debug!(session = %self.id, "memory transport: logout");
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        debug!(session = %self.id, "memory transport: closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InboundMessage;

    fn sid(s: &str) -> SessionId {
        SessionId::new(s)
    }

    #[tokio::test]
    async fn registered_auth_opens_connected() {
        let factory = MemoryTransportFactory::new();
        let id = sid("alpha");
        let auth = AuthState::registered(&Jid::user("123"));

        let (transport, mut events) = factory.open(&id, auth).await.unwrap();

        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Connected)
        ));
        let msg_id = transport
            .send_message(&Jid::user("456"), MessageContent::text("hello"))
            .await
            .unwrap();
        assert!(!msg_id.is_empty());

        let sent = factory.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].session, id);
        assert_eq!(sent[0].to.as_str(), "456@s.whatsapp.net");
    }

    #[tokio::test]
    async fn unregistered_auth_requires_pairing() {
        let factory = MemoryTransportFactory::new();
        let id = sid("beta");

        let (transport, mut events) = factory.open(&id, AuthState::empty()).await.unwrap();

        match events.recv().await {
            Some(TransportEvent::PairingRequired { code }) => {
                assert!(code.starts_with("pair-beta-"));
            }
            other => panic!("expected pairing event, got {other:?}"),
        }

        // Not connected yet: operations are refused.
        let err = transport
            .send_message(&Jid::user("1"), MessageContent::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));

        assert!(factory.complete_pairing(&id).await);
        match events.recv().await {
            Some(TransportEvent::CredentialsChanged { auth }) => {
                assert!(auth.is_registered());
            }
            other => panic!("expected credentials event, got {other:?}"),
        }
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Connected)
        ));
    }

    #[tokio::test]
    async fn scripted_failures_and_close_reasons() {
        let factory = MemoryTransportFactory::new();
        let id = sid("gamma");
        factory.fail_opens(&id, 1).await;

        let err = factory.open(&id, AuthState::empty()).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));

        let auth = AuthState::registered(&Jid::user("123"));
        let (_transport, mut events) = factory.open(&id, auth).await.unwrap();
        let _ = events.recv().await; // Connected

        assert!(
            factory
                .close_session(&id, DisconnectReason::RestartRequired)
                .await
        );
        match events.recv().await {
            Some(TransportEvent::Disconnected { reason }) => {
                assert!(reason.wants_immediate_restart());
            }
            other => panic!("expected disconnect, got {other:?}"),
        }
        assert_eq!(factory.opens_for(&id).await, 1);
    }

    #[tokio::test]
    async fn inbound_injection_reaches_the_stream() {
        let factory = MemoryTransportFactory::new();
        let id = sid("delta");
        let auth = AuthState::registered(&Jid::user("123"));
        let (_transport, mut events) = factory.open(&id, auth).await.unwrap();
        let _ = events.recv().await; // Connected

        let message = InboundMessage {
            id: "m1".into(),
            chat: Jid::user("777"),
            from_me: false,
            timestamp: chrono::Utc::now(),
            content: MessageContent::text("ping"),
        };
        assert!(factory.inject_inbound(&id, message.clone()).await);

        match events.recv().await {
            Some(TransportEvent::MessageReceived { message: got }) => {
                assert_eq!(got.id, message.id);
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }
}
