//! Builder pattern for constructing Assay instances
//!
//! This module provides a type-safe builder for creating [`Assay`] instances with
//! compile-time validation of store configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use assay::AssayBuilder;
//! use chrono::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let assay = AssayBuilder::new()
//!         .with_memory_store()
//!         .with_authenticated_lifetime(Duration::hours(8))
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Duration;

use crate::{
    Assay, EventBus, EventHandler, MemoryStore, SessionConfig, SessionStore, TieredStore,
    TokenRefreshHook,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when building an Assay instance.
#[derive(Debug, thiserror::Error)]
pub enum AssayBuilderError {
    /// The session store failed its startup health check
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

// ============================================================================
// Type-State Markers
// ============================================================================

/// Marker type indicating no session store has been configured yet.
///
/// This is the initial state of [`AssayBuilder`].
pub struct NoStore;

/// Marker type indicating a session store has been configured.
pub struct WithStore<S: SessionStore> {
    store: S,
}

// ============================================================================
// Builder Implementation
// ============================================================================

/// A type-safe builder for constructing [`Assay`] instances.
///
/// # Type States
///
/// - [`NoStore`]: Initial state, a session store must be configured
/// - [`WithStore<S>`]: Store configured, ready to build or add more configuration
pub struct AssayBuilder<Store> {
    store: Store,
    session_config: SessionConfig,
    refresh_hook: Option<Arc<dyn TokenRefreshHook>>,
    event_handlers: Vec<Arc<dyn EventHandler>>,
    verify_store: bool,
}

impl Default for AssayBuilder<NoStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl AssayBuilder<NoStore> {
    /// Create a new builder with default configuration.
    ///
    /// # Defaults
    ///
    /// - Authenticated lifetime: 4 hours, extended when under 30 minutes remain
    /// - Visitor lifetime: 24 hours
    /// - Store health-checked on build
    pub fn new() -> Self {
        Self {
            store: NoStore,
            session_config: SessionConfig::default(),
            refresh_hook: None,
            event_handlers: Vec::new(),
            verify_store: true,
        }
    }

    /// Use the given store as the primary session store
    pub fn with_store<S: SessionStore>(self, store: S) -> AssayBuilder<WithStore<S>> {
        AssayBuilder {
            store: WithStore { store },
            session_config: self.session_config,
            refresh_hook: self.refresh_hook,
            event_handlers: self.event_handlers,
            verify_store: self.verify_store,
        }
    }

    /// Keep sessions in process memory only
    ///
    /// Sessions are lost on restart. Intended for development and tests.
    pub fn with_memory_store(self) -> AssayBuilder<WithStore<MemoryStore>> {
        self.with_store(MemoryStore::new())
    }
}

// ============================================================================
// Configuration Methods (available after store is configured)
// ============================================================================

impl<S: SessionStore> AssayBuilder<WithStore<S>> {
    /// Put a bounded in-memory tier behind the configured store
    ///
    /// Records the primary store fails to accept are kept in memory, up to
    /// `capacity` entries, and served from there until they expire.
    pub fn with_memory_fallback(self, capacity: usize) -> AssayBuilder<WithStore<TieredStore<S>>> {
        AssayBuilder {
            store: WithStore {
                store: TieredStore::with_memory_fallback(self.store.store, capacity),
            },
            session_config: self.session_config,
            refresh_hook: self.refresh_hook,
            event_handlers: self.event_handlers,
            verify_store: self.verify_store,
        }
    }

    /// Replace the whole session configuration
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Set the lifetime granted at sign-in and on each extension
    pub fn with_authenticated_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_config = self.session_config.with_authenticated_lifetime(lifetime);
        self
    }

    /// Set the remaining lifetime under which sessions are extended
    pub fn with_extension_threshold(mut self, threshold: Duration) -> Self {
        self.session_config = self.session_config.with_extension_threshold(threshold);
        self
    }

    pub fn with_visitor_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_config = self.session_config.with_visitor_lifetime(lifetime);
        self
    }

    /// Exclude an additional path prefix from visitor tracking
    pub fn with_untracked_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_config = self.session_config.with_untracked_prefix(prefix);
        self
    }

    /// Install a hook that refreshes identity-provider credentials
    ///
    /// The hook runs for every authenticated session that survives validation.
    pub fn with_refresh_hook(mut self, hook: Arc<dyn TokenRefreshHook>) -> Self {
        self.refresh_hook = Some(hook);
        self
    }

    /// Register an event handler before the first request is served
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    /// Whether to run a store health check during [`build`](Self::build)
    pub fn verify_store(mut self, verify: bool) -> Self {
        self.verify_store = verify;
        self
    }

    /// Build the Assay instance.
    ///
    /// # Errors
    ///
    /// Returns [`AssayBuilderError::InvalidConfiguration`] if a lifetime is not
    /// positive or the extension threshold is not shorter than the
    /// authenticated lifetime, and [`AssayBuilderError::StorageConnection`] if
    /// the store health check fails.
    pub async fn build(self) -> Result<Assay<S>, AssayBuilderError> {
        validate_config(&self.session_config)?;

        if self.verify_store {
            self.store
                .store
                .health_check()
                .await
                .map_err(|e| AssayBuilderError::StorageConnection(e.to_string()))?;
        }

        let events = EventBus::new();
        for handler in self.event_handlers {
            events.register(handler).await;
        }

        tracing::debug!(
            authenticated_lifetime = %self.session_config.authenticated_lifetime,
            extension_threshold = %self.session_config.extension_threshold,
            "Building Assay instance"
        );

        Ok(Assay::from_parts(
            Arc::new(self.store.store),
            events,
            self.session_config,
            self.refresh_hook,
        ))
    }
}

fn validate_config(config: &SessionConfig) -> Result<(), AssayBuilderError> {
    if config.authenticated_lifetime <= Duration::zero() {
        return Err(AssayBuilderError::InvalidConfiguration(
            "authenticated lifetime must be positive".to_string(),
        ));
    }
    if config.visitor_lifetime <= Duration::zero() {
        return Err(AssayBuilderError::InvalidConfiguration(
            "visitor lifetime must be positive".to_string(),
        ));
    }
    if config.extension_threshold >= config.authenticated_lifetime {
        return Err(AssayBuilderError::InvalidConfiguration(
            "extension threshold must be shorter than the authenticated lifetime".to_string(),
        ));
    }
    Ok(())
}
