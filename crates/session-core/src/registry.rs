//! Session registry.
//!
//! Keyed storage for live session handles. The registry is the single point
//! of truth for "does a session with this id exist right now"; creation
//! races are settled here by [`SessionRegistry::insert_if_absent`] under one
//! write lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use rmsg_transport::SessionId;

use crate::session::SessionHandle;

/// Shared map of live sessions plus counters.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<SessionHandle>>>>,
    stats: Arc<RwLock<RegistryStats>>,
}

/// Lifetime counters for the registry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_created: usize,
    pub total_removed: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(RegistryStats::default())),
        }
    }

    /// Insert `handle` unless a session with the same id is already live.
    ///
    /// Returns the handle now in the registry and whether the insert won.
    /// Losers get the incumbent back, which is what makes concurrent
    /// creation collapse onto one attempt.
    pub async fn insert_if_absent(
        &self,
        handle: Arc<SessionHandle>,
    ) -> (Arc<SessionHandle>, bool) {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&handle.id) {
            return (Arc::clone(existing), false);
        }
        sessions.insert(handle.id.clone(), Arc::clone(&handle));
        self.stats.write().await.total_created += 1;
        debug!("Registered session: {}", handle.id);
        (handle, true)
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Drop a session from the map. Returns the removed handle, if any.
    pub async fn remove(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            self.stats.write().await.total_removed += 1;
            debug!("Unregistered session: {}", id);
        }
        removed
    }

    pub async fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn stats(&self) -> RegistryStats {
        *self.stats.read().await
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CreationCell;
    use rmsg_transport::AuthVariant;

    fn handle(id: &str, epoch: u64) -> Arc<SessionHandle> {
        Arc::new(SessionHandle::new(
            SessionId::new(id),
            AuthVariant::Modern,
            epoch,
            1,
            CreationCell { artifact: None, waiters: Vec::new() },
        ))
    }

    #[tokio::test]
    async fn insert_get_remove() {
        let registry = SessionRegistry::new();
        let (_, inserted) = registry.insert_if_absent(handle("alpha", 1)).await;
        assert!(inserted);
        assert!(registry.contains(&SessionId::new("alpha")).await);
        assert_eq!(registry.len().await, 1);

        assert!(registry.remove(&SessionId::new("alpha")).await.is_some());
        assert!(registry.get(&SessionId::new("alpha")).await.is_none());
        assert!(registry.remove(&SessionId::new("alpha")).await.is_none());

        let stats = registry.stats().await;
        assert_eq!(stats, RegistryStats { total_created: 1, total_removed: 1 });
    }

    #[tokio::test]
    async fn second_insert_loses_and_gets_the_incumbent() {
        let registry = SessionRegistry::new();
        let (first, inserted) = registry.insert_if_absent(handle("alpha", 1)).await;
        assert!(inserted);

        let (winner, inserted) = registry.insert_if_absent(handle("alpha", 2)).await;
        assert!(!inserted);
        assert_eq!(winner.epoch, first.epoch);
        assert_eq!(registry.stats().await.total_created, 1);
    }
}
