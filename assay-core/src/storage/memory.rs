//! In-process session store
//!
//! Entries are evicted lazily when read after their ttl. With a capacity
//! bound, inserting into a full store first drops evicted entries and then the
//! entry closest to eviction.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::{
    Error,
    session::{SessionId, SessionRecord},
};

use super::SessionStore;

#[derive(Debug, Clone)]
struct Entry {
    record: SessionRecord,
    evict_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<SessionId, Entry>,
    capacity: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding at most `capacity` records
    pub fn bounded(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of entries currently held, including ones past their ttl
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry whose ttl has passed, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.evict_at > now);
        before - self.entries.len()
    }

    fn make_room(&self, incoming: &SessionId) {
        let Some(capacity) = self.capacity else {
            return;
        };
        if self.entries.contains_key(incoming) || self.entries.len() < capacity {
            return;
        }

        if self.purge_expired() > 0 && self.entries.len() < capacity {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().evict_at)
            .map(|entry| entry.key().clone());

        if let Some(id) = oldest {
            tracing::debug!(session_id = %id, "Evicting session from full memory store");
            self.entries.remove(&id);
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, Error> {
        let now = Utc::now();
        if self
            .entries
            .remove_if(id, |_, entry| entry.evict_at <= now)
            .is_some()
        {
            return Ok(None);
        }

        Ok(self.entries.get(id).map(|entry| entry.record.clone()))
    }

    async fn set(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), Error> {
        self.make_room(id);
        self.entries.insert(
            id.clone(),
            Entry {
                record: record.clone(),
                evict_at: Utc::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), Error> {
        self.entries.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionUser;

    fn record(id: &str) -> SessionRecord {
        SessionRecord::authenticated(
            SessionId::new(id),
            SessionUser::new("u1"),
            None,
            Utc::now() + Duration::hours(4),
        )
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        let id = SessionId::new("ses_1");
        let stored = record("ses_1");

        store.set(&id, &stored, Duration::hours(1)).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(stored));

        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());

        // deleting again is not an error
        store.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_eviction_on_read() {
        let store = MemoryStore::new();
        let id = SessionId::new("ses_1");

        store
            .set(&id, &record("ses_1"), Duration::milliseconds(-1))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_store_evicts_closest_to_eviction() {
        let store = MemoryStore::bounded(2);
        let a = SessionId::new("ses_a");
        let b = SessionId::new("ses_b");
        let c = SessionId::new("ses_c");

        store.set(&a, &record("ses_a"), Duration::minutes(5)).await.unwrap();
        store.set(&b, &record("ses_b"), Duration::hours(1)).await.unwrap();
        store.set(&c, &record("ses_c"), Duration::hours(2)).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get(&a).await.unwrap().is_none());
        assert!(store.get(&b).await.unwrap().is_some());
        assert!(store.get(&c).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bounded_store_overwrite_does_not_evict() {
        let store = MemoryStore::bounded(2);
        let a = SessionId::new("ses_a");
        let b = SessionId::new("ses_b");

        store.set(&a, &record("ses_a"), Duration::minutes(5)).await.unwrap();
        store.set(&b, &record("ses_b"), Duration::hours(1)).await.unwrap();
        store.set(&a, &record("ses_a"), Duration::hours(3)).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get(&a).await.unwrap().is_some());
        assert!(store.get(&b).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store
            .set(&SessionId::new("ses_old"), &record("ses_old"), Duration::milliseconds(-1))
            .await
            .unwrap();
        store
            .set(&SessionId::new("ses_new"), &record("ses_new"), Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
