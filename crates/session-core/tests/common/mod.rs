//! Shared helpers for session lifecycle integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use rmsg_session_core::{CredentialStore, SessionConfig, SessionManager};
use rmsg_transport::MemoryTransportFactory;

/// One manager wired to an in-memory transport and a throwaway store dir.
pub struct TestRig {
    pub manager: Arc<SessionManager>,
    pub factory: MemoryTransportFactory,
    pub store: Arc<CredentialStore>,
    pub dir: TempDir,
}

pub struct TestRigBuilder {
    config: SessionConfig,
}

impl TestRigBuilder {
    pub fn new() -> Self {
        let mut config = SessionConfig::default();
        // Lifecycle tests drive timers explicitly; park eviction far away
        // unless a test opts in.
        config.idle_timeout = Duration::from_secs(3600);
        Self { config }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn webhook(mut self, url: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.webhook_url = Some(url.into());
        self.config.webhook_secret = Some(secret.into());
        self
    }

    pub fn build(self) -> TestRig {
        let dir = tempfile::tempdir().unwrap();
        let mut config = self.config;
        config.sessions_dir = dir.path().to_path_buf();

        let store = Arc::new(CredentialStore::new(dir.path()));
        let factory = MemoryTransportFactory::new();
        let manager =
            SessionManager::new(config, Arc::clone(&store), Arc::new(factory.clone()));
        TestRig { manager, factory, store, dir }
    }
}

pub fn rig() -> TestRigBuilder {
    TestRigBuilder::new()
}

/// Run every currently runnable task to quiescence without letting a paused
/// clock jump forward. Use for "nothing should have happened yet" checks.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Poll until `cond` holds. The short sleep keeps paused-clock tests moving
/// once all tasks are parked on timers.
pub async fn wait_until<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..10_000 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}
