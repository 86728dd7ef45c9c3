//! Primary store with an optional fallback tier
//!
//! The fallback only ever receives records the primary failed to accept, and
//! only answers reads the primary could not.

use async_trait::async_trait;
use chrono::Duration;

use crate::{
    Error,
    session::{SessionId, SessionRecord},
};

use super::{MemoryStore, SessionStore};

pub struct TieredStore<P, F = MemoryStore> {
    primary: P,
    fallback: Option<F>,
}

impl<P: SessionStore> TieredStore<P> {
    /// Wrap a primary store without a fallback tier
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    /// Wrap a primary store with a bounded in-memory fallback
    pub fn with_memory_fallback(primary: P, capacity: usize) -> Self {
        Self::with_fallback(primary, MemoryStore::bounded(capacity))
    }
}

impl<P: SessionStore, F: SessionStore> TieredStore<P, F> {
    pub fn with_fallback(primary: P, fallback: F) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
        }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn fallback(&self) -> Option<&F> {
        self.fallback.as_ref()
    }
}

#[async_trait]
impl<P: SessionStore, F: SessionStore> SessionStore for TieredStore<P, F> {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, Error> {
        match self.primary.get(id).await {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => match &self.fallback {
                Some(fallback) => fallback.get(id).await,
                None => Ok(None),
            },
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(session_id = %id, error = %e, "Primary session store read failed, using fallback");
                    fallback.get(id).await
                }
                None => Err(e),
            },
        }
    }

    async fn set(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), Error> {
        match self.primary.set(id, record, ttl).await {
            Ok(()) => {
                // the primary copy is now authoritative
                if let Some(fallback) = &self.fallback {
                    if let Err(e) = fallback.delete(id).await {
                        tracing::debug!(session_id = %id, error = %e, "Failed to clear fallback copy");
                    }
                }
                Ok(())
            }
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(session_id = %id, error = %e, "Primary session store write failed, using fallback");
                    fallback.set(id, record, ttl).await
                }
                None => Err(e),
            },
        }
    }

    /// Delete from both tiers
    ///
    /// A primary failure is returned even when the fallback copy was removed,
    /// since the primary copy would authenticate again once the store recovers.
    async fn delete(&self, id: &SessionId) -> Result<(), Error> {
        let primary = self.primary.delete(id).await;

        if let Some(fallback) = &self.fallback {
            fallback.delete(id).await?;
        }

        if let Err(e) = &primary {
            tracing::warn!(session_id = %id, error = %e, "Primary session store delete failed");
        }
        primary
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.primary.health_check().await
    }
}
