//! Session store with LRU eviction and TTL support.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::id::SessionId;
use crate::ttl::TtlTracker;

/// Entry stored per session.
struct SessionEntry<V> {
    value: V,
    created_at: DateTime<Utc>,
    /// Last access through the store.
    last_accessed: DateTime<Utc>,
}

impl<V> SessionEntry<V> {
    fn new(value: V) -> Self {
        let now = Utc::now();
        Self {
            value,
            created_at: now,
            last_accessed: now,
        }
    }

    fn age(&self) -> chrono::TimeDelta {
        Utc::now() - self.created_at
    }
}

struct StoreInner<V> {
    lru: LruCache<SessionId, SessionEntry<V>>,
    ttl: TtlTracker,
}

impl<V> StoreInner<V> {
    /// Drop the session if its idle timeout has passed. Returns true if dropped.
    fn expire_if_idle(&mut self, id: &SessionId) -> bool {
        if self.lru.contains(id)
            && self.ttl.is_expired(id)
            && let Some(entry) = self.lru.pop(id)
        {
            debug!(
                session_id = %id,
                last_accessed = %entry.last_accessed,
                "Session expired, removing from store"
            );
            self.ttl.remove(id);
            return true;
        }
        false
    }

    /// Touch a live session. Unknown ids leave no trace in the idle tracker.
    fn live_entry(&mut self, id: &SessionId) -> Option<&mut SessionEntry<V>> {
        if self.expire_if_idle(id) {
            return None;
        }
        let entry = self.lru.get_mut(id)?;
        self.ttl.touch(id);
        entry.last_accessed = Utc::now();
        Some(entry)
    }

    /// Insert, evicting the least recently used session at capacity.
    fn put(&mut self, id: SessionId, entry: SessionEntry<V>, capacity: usize) {
        if self.lru.len() >= capacity
            && !self.lru.contains(&id)
            && let Some((evicted, entry)) = self.lru.pop_lru()
        {
            debug!(
                session_id = %evicted,
                age_secs = entry.age().num_seconds(),
                "Evicting LRU session to make room"
            );
            self.ttl.remove(&evicted);
        }
        self.lru.put(id, entry);
        self.ttl.touch(&id);
    }
}

/// In-memory session store with LRU eviction and optional idle timeout.
///
/// Cloning the store is cheap and yields a handle to the same sessions.
/// Every accessor takes the lock for one operation only, so concurrent
/// requests on the same session observe last-writer-wins semantics.
pub struct SessionStore<V> {
    inner: Arc<RwLock<StoreInner<V>>>,
    config: SessionConfig,
}

impl<V> Clone for SessionStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

impl<V> SessionStore<V>
where
    V: Clone + Default + Send + Sync + 'static,
{
    /// Create an empty store.
    pub fn new(config: SessionConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);

        let inner = StoreInner {
            lru: LruCache::new(cap),
            ttl: TtlTracker::new(config.ttl),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            config,
        }
    }

    /// Get the store configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of sessions currently held (including not-yet-swept expired ones).
    pub async fn len(&self) -> usize {
        self.inner.read().await.lru.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.lru.is_empty()
    }

    /// Create a new session holding `V::default()`.
    pub async fn create(&self) -> SessionId {
        let id = SessionId::new();
        let mut inner = self.inner.write().await;
        inner.put(id, SessionEntry::new(V::default()), self.config.max_sessions.max(1));
        trace!(session_id = %id, sessions = inner.lru.len(), "Session created");
        id
    }

    /// Check if a live session exists (without touching it).
    pub async fn contains(&self, id: &SessionId) -> bool {
        let inner = self.inner.read().await;
        inner.lru.contains(id) && !inner.ttl.is_expired(id)
    }

    /// Get a copy of the session value. Updates LRU order and idle timer.
    pub async fn get(&self, id: &SessionId) -> Option<V> {
        self.with_ref(id, V::clone).await
    }

    /// Read-only access to a session value. Updates LRU order and idle timer.
    pub async fn with_ref<F, R>(&self, id: &SessionId, f: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        let mut inner = self.inner.write().await;
        inner.live_entry(id).map(|entry| f(&entry.value))
    }

    /// Mutable access to a session value. Updates LRU order and idle timer.
    pub async fn with_mut<F, R>(&self, id: &SessionId, f: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        let mut inner = self.inner.write().await;
        inner.live_entry(id).map(|entry| f(&mut entry.value))
    }

    /// Like [`with_mut`](Self::with_mut) but reports a missing session as an error.
    pub async fn update<F, R>(&self, id: &SessionId, f: F) -> Result<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        self.with_mut(id, f)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Move a session to a freshly generated id and return it.
    ///
    /// The old id stops resolving immediately.
    pub async fn change_id(&self, id: &SessionId) -> Result<SessionId> {
        let mut inner = self.inner.write().await;
        if inner.expire_if_idle(id) {
            return Err(Error::Expired(id.to_string()));
        }
        let mut entry = inner
            .lru
            .pop(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        inner.ttl.remove(id);

        let new_id = SessionId::new();
        entry.last_accessed = Utc::now();
        inner.put(new_id, entry, self.config.max_sessions.max(1));
        debug!(old_session_id = %id, session_id = %new_id, "Session id changed");
        Ok(new_id)
    }

    /// Remove a session, returning its value.
    pub async fn invalidate(&self, id: &SessionId) -> Option<V> {
        let mut inner = self.inner.write().await;
        inner.ttl.remove(id);
        let entry = inner.lru.pop(id)?;
        debug!(
            session_id = %id,
            age_secs = entry.age().num_seconds(),
            "Session invalidated"
        );
        Some(entry.value)
    }

    /// Remove every expired session and return how many were dropped.
    ///
    /// This is called by the background task if `enable_cleanup_task` is
    /// true, but can also be called manually.
    pub async fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let expired = inner.ttl.drain_expired();
        let mut count = 0;
        for id in expired {
            if inner.lru.pop(&id).is_some() {
                count += 1;
            }
        }
        if count > 0 {
            debug!(count, "Cleaned up expired sessions");
        }
        count
    }

    /// Spawn the periodic cleanup task, if enabled in the configuration.
    pub fn spawn_cleanup_task(&self) -> Option<JoinHandle<()>> {
        if !self.config.enable_cleanup_task || self.config.ttl.is_none() {
            return None;
        }
        let store = self.clone();
        let interval = self.config.cleanup_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.cleanup_expired().await;
            }
        }))
    }

    /// Get store statistics.
    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        StoreStats {
            size: inner.lru.len(),
            capacity: self.config.max_sessions,
            ttl_tracked: inner.ttl.len(),
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Current number of sessions.
    pub size: usize,

    /// Maximum capacity.
    pub capacity: usize,

    /// Number of sessions being tracked for idle timeout.
    pub ttl_tracked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Notes {
        values: Vec<u8>,
    }

    fn store(config: SessionConfig) -> SessionStore<Notes> {
        SessionStore::new(config)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store(SessionConfig::new().with_max_sessions(10));
        let id = store.create().await;

        assert_eq!(store.get(&id).await, Some(Notes::default()));
        assert!(store.contains(&id).await);
    }

    #[tokio::test]
    async fn test_update_missing_session() {
        let store = store(SessionConfig::new());
        let result = store.update(&SessionId::new(), |n| n.values.push(1)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_with_mut_persists_changes() {
        let store = store(SessionConfig::new());
        let id = store.create().await;

        let len = store
            .with_mut(&id, |n| {
                n.values.extend([1, 2, 3]);
                n.values.len()
            })
            .await;
        assert_eq!(len, Some(3));

        let notes = store.get(&id).await.unwrap();
        assert_eq!(notes.values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let store = store(SessionConfig::new().with_max_sessions(3));
        let first = store.create().await;
        let second = store.create().await;
        let third = store.create().await;

        // Touch the first so the second becomes least recently used
        let _ = store.get(&first).await;
        let fourth = store.create().await;

        assert_eq!(store.len().await, 3);
        assert!(store.contains(&first).await);
        assert!(!store.contains(&second).await);
        assert!(store.contains(&third).await);
        assert!(store.contains(&fourth).await);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let store = store(
            SessionConfig::new()
                .with_max_sessions(10)
                .with_ttl(Duration::from_millis(50)),
        );
        let id = store.create().await;
        assert!(store.contains(&id).await);

        sleep(Duration::from_millis(100)).await;

        assert!(!store.contains(&id).await);
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_access_resets_ttl() {
        let store = store(
            SessionConfig::new()
                .with_max_sessions(10)
                .with_ttl(Duration::from_millis(100)),
        );
        let id = store.create().await;

        sleep(Duration::from_millis(60)).await;
        let _ = store.get(&id).await;
        sleep(Duration::from_millis(60)).await;

        assert!(store.contains(&id).await);
    }

    #[tokio::test]
    async fn test_change_id_moves_value() {
        let store = store(SessionConfig::new());
        let id = store.create().await;
        store.update(&id, |n| n.values.push(7)).await.unwrap();

        let new_id = store.change_id(&id).await.unwrap();

        assert_ne!(new_id, id);
        assert!(!store.contains(&id).await);
        assert_eq!(store.get(&new_id).await.unwrap().values, vec![7]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_change_id_unknown_session() {
        let store = store(SessionConfig::new());
        let result = store.change_id(&SessionId::new()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let store = store(SessionConfig::new());
        let id = store.create().await;

        assert!(store.invalidate(&id).await.is_some());
        assert!(!store.contains(&id).await);
        assert!(store.invalidate(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = store(
            SessionConfig::new()
                .with_max_sessions(10)
                .with_ttl(Duration::from_millis(50)),
        );
        for _ in 0..3 {
            store.create().await;
        }
        assert_eq!(store.len().await, 3);

        sleep(Duration::from_millis(100)).await;

        assert_eq!(store.cleanup_expired().await, 3);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_task_disabled_without_ttl() {
        let store = store(SessionConfig::new().without_ttl());
        assert!(store.spawn_cleanup_task().is_none());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_tracked() {
        let store = store(SessionConfig::new().without_ttl());
        for _ in 0..100 {
            assert!(store.with_ref(&SessionId::new(), |_| ()).await.is_none());
            assert!(store.with_mut(&SessionId::new(), |_| ()).await.is_none());
        }

        let stats = store.stats().await;
        assert_eq!(stats.size, 0);
        assert_eq!(stats.ttl_tracked, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = store(SessionConfig::new().with_max_sessions(100));
        for _ in 0..5 {
            store.create().await;
        }

        let stats = store.stats().await;
        assert_eq!(stats.size, 5);
        assert_eq!(stats.capacity, 100);
        assert_eq!(stats.ttl_tracked, 5);
    }
}
