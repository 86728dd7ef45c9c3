//! Session storage
//!
//! [`SessionStore`] is the key-value contract the lifecycle runs against. It is
//! usually backed by a cache shared between server instances; this crate ships
//! an in-process [`MemoryStore`] and a [`TieredStore`] that puts a bounded
//! memory tier behind any primary store.

pub mod memory;
pub mod tiered;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::{
    Error,
    session::{SessionId, SessionRecord},
};

pub use memory::MemoryStore;
pub use tiered::TieredStore;

#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, Error>;

    /// Store `record` under `id`, to be evicted by the store after `ttl`
    async fn set(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), Error>;

    /// Remove the record under `id`. Removing a missing id is not an error.
    async fn delete(&self, id: &SessionId) -> Result<(), Error>;

    /// Store health check
    ///
    /// The default implementation performs a lookup of an id that cannot exist.
    async fn health_check(&self) -> Result<(), Error> {
        let sentinel = SessionId::new(&format!("ses_health_{}", Uuid::new_v4().simple()));
        self.get(&sentinel).await.map(|_| ())
    }
}

#[async_trait]
impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, Error> {
        (**self).get(id).await
    }

    async fn set(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), Error> {
        (**self).set(id, record, ttl).await
    }

    async fn delete(&self, id: &SessionId) -> Result<(), Error> {
        (**self).delete(id).await
    }

    async fn health_check(&self) -> Result<(), Error> {
        (**self).health_check().await
    }
}

/// Implementation of SessionStore for Box<dyn SessionStore>
/// This allows for dynamic dispatch of session stores
#[async_trait]
impl SessionStore for Box<dyn SessionStore> {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, Error> {
        (**self).get(id).await
    }

    async fn set(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), Error> {
        (**self).set(id, record, ttl).await
    }

    async fn delete(&self, id: &SessionId) -> Result<(), Error> {
        (**self).delete(id).await
    }

    async fn health_check(&self) -> Result<(), Error> {
        (**self).health_check().await
    }
}
