//! Token refresh hook
//!
//! Applications that hold short-lived credentials from an identity provider
//! plug a [`TokenRefreshHook`] into the lifecycle service. The hook runs after
//! the expiry and extension checks for every valid authenticated session.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Error,
    session::{Resolution, SessionId, SessionRecord},
    storage::SessionStore,
};

/// Hook consulted for every valid authenticated session
///
/// Returning `Ok(Some(resolution))` replaces the lifecycle service's own
/// decision. Returning `Ok(None)` leaves it in place. Implementations should
/// fail closed by returning `Ok(Some(Resolution::Unauthenticated))`; an `Err`
/// is also treated as unauthenticated.
#[async_trait]
pub trait TokenRefreshHook: Send + Sync + 'static {
    /// # Arguments
    /// * `record` - The record after any extension was applied
    /// * `session_id` - The id the record is stored under
    /// * `store` - The session store, for hooks that persist renewed tokens
    /// * `current` - The record exactly as it was read from the store
    async fn refresh(
        &self,
        record: &SessionRecord,
        session_id: &SessionId,
        store: &dyn SessionStore,
        current: &SessionRecord,
    ) -> Result<Option<Resolution>, Error>;
}

#[async_trait]
impl<H: TokenRefreshHook + ?Sized> TokenRefreshHook for Arc<H> {
    async fn refresh(
        &self,
        record: &SessionRecord,
        session_id: &SessionId,
        store: &dyn SessionStore,
        current: &SessionRecord,
    ) -> Result<Option<Resolution>, Error> {
        (**self).refresh(record, session_id, store, current).await
    }
}
