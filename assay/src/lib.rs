//! # Assay
//!
//! Assay resolves the session behind every request of a server-rendered
//! application. A request either carries a reference to a valid authenticated
//! session, or it is anonymous and gets tracked as a visitor for page-view
//! analytics.
//!
//! With Assay you get:
//! - Authenticated sessions extended automatically while in use
//! - Expired sessions dropped from the store on first sight
//! - Anonymous visitor sessions with page-view counts
//! - Promotion of a visitor session on sign-in, keeping its history
//! - A pluggable token refresh hook for identity-provider credentials
//! - A primary session store with an optional bounded in-memory fallback
//!
//! Authentication itself (for example the OIDC exchange) happens elsewhere;
//! Assay takes over once the identity provider has returned a user.
//!
//! ## Example
//!
//! ```rust,no_run
//! use assay::{AssayBuilder, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let assay = AssayBuilder::new()
//!         .with_memory_store()
//!         .build()
//!         .await?;
//!
//!     let outcome = assay.resolve(None, &RequestContext::new("/projects")).await;
//!     assert!(!outcome.resolution.is_valid());
//!     Ok(())
//! }
//! ```
mod builder;

use std::sync::Arc;

use assay_core::{SessionLifecycleService, VisitorService};

pub use builder::{AssayBuilder, AssayBuilderError, NoStore, WithStore};

/// Re-export core types from assay_core
///
/// These types are commonly used when working with the Assay API.
pub use assay_core::{
    CookieDecision, Credentials, Event, EventBus, EventHandler, MemoryStore, PageViewEvent,
    RequestContext, Resolution, SessionConfig, SessionId, SessionOutcome, SessionRecord,
    SessionStore, SessionUser, TieredStore, TokenRefreshHook, Visitor, VisitorId,
};

/// Errors that can occur when using Assay.
#[derive(Debug, thiserror::Error)]
pub enum AssayError {
    /// Error when interacting with the session store
    #[error("Storage error: {0}")]
    StorageError(String),
    /// Error establishing or ending a session
    #[error("Session error: {0}")]
    SessionError(String),
}

impl From<assay_core::Error> for AssayError {
    fn from(err: assay_core::Error) -> Self {
        match err {
            assay_core::Error::Storage(e) => AssayError::StorageError(e.to_string()),
            other => AssayError::SessionError(other.to_string()),
        }
    }
}

/// The central coordinator applications hold on to.
///
/// `Assay` owns the session store and the services built on it. It is cheap
/// to share behind an `Arc` across request handlers.
pub struct Assay<S: SessionStore> {
    store: Arc<S>,
    lifecycle: Arc<SessionLifecycleService<S>>,
    events: EventBus,
}

impl<S: SessionStore> Assay<S> {
    /// Create a new Assay instance with default configuration
    ///
    /// Use [`AssayBuilder`] to add a fallback tier, a refresh hook or event handlers.
    pub fn new(store: Arc<S>) -> Self {
        Self::from_parts(store, EventBus::new(), SessionConfig::default(), None)
    }

    pub(crate) fn from_parts(
        store: Arc<S>,
        events: EventBus,
        config: SessionConfig,
        refresh_hook: Option<Arc<dyn TokenRefreshHook>>,
    ) -> Self {
        let mut lifecycle = SessionLifecycleService::new(store.clone(), events.clone(), config);
        if let Some(hook) = refresh_hook {
            lifecycle = lifecycle.with_refresh_hook(hook);
        }

        Self {
            store,
            lifecycle: Arc::new(lifecycle),
            events,
        }
    }

    /// Resolve the session reference of an incoming request
    ///
    /// This never fails; see [`SessionLifecycleService::resolve`].
    pub async fn resolve(
        &self,
        session_id: Option<&SessionId>,
        request: &RequestContext,
    ) -> SessionOutcome {
        self.lifecycle.resolve(session_id, request).await
    }

    /// Establish an authenticated session once the identity provider has returned a user
    ///
    /// # Arguments
    ///
    /// * `session_id` - The session reference the browser currently holds, if any
    /// * `user` - The authenticated identity
    /// * `token` - The bearer credential issued by the identity provider, if any
    pub async fn sign_in(
        &self,
        session_id: Option<&SessionId>,
        user: SessionUser,
        token: Option<String>,
    ) -> Result<SessionOutcome, AssayError> {
        Ok(self.lifecycle.sign_in(session_id, user, token).await?)
    }

    /// End a session
    pub async fn sign_out(&self, session_id: Option<&SessionId>) -> Result<SessionOutcome, AssayError> {
        Ok(self.lifecycle.sign_out(session_id).await?)
    }

    /// Look up a session record by id
    pub async fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, AssayError> {
        Ok(self.store.get(session_id).await?)
    }

    /// Check that the session store answers
    pub async fn health_check(&self) -> Result<(), AssayError> {
        self.store
            .health_check()
            .await
            .map_err(|e| AssayError::StorageError(e.to_string()))
    }

    /// Register an additional event handler
    pub async fn register_event_handler(&self, handler: Arc<dyn EventHandler>) {
        self.events.register(handler).await;
    }

    pub fn visitors(&self) -> &VisitorService<S> {
        self.lifecycle.visitors()
    }

    pub fn config(&self) -> &SessionConfig {
        self.lifecycle.config()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: SessionStore> Clone for Assay<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            lifecycle: self.lifecycle.clone(),
            events: self.events.clone(),
        }
    }
}
