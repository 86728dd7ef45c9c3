use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    error::EventError,
    session::{SessionId, VisitorId},
};

/// Referer reported when a request carries none.
pub const DIRECT_REFERER: &str = "direct";

/// Analytics payload attached to visitor events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageViewEvent {
    pub path: String,
    pub user_agent: Option<String>,
    /// The request's referer, or [`DIRECT_REFERER`]
    pub referer: String,
    pub visitor_id: VisitorId,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
}

/// Represents events that can be emitted by the event bus
///
/// Visitor events feed page-view analytics. Session events describe
/// transitions of authenticated sessions and are useful for audit logging.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // Visitor events
    /// A browser was seen for the first time and given a visitor id.
    UniqueVisitor(PageViewEvent),
    /// Any tracked page view, including the first one.
    PageView(PageViewEvent),

    // Session events
    SessionCreated {
        session_id: SessionId,
        user_id: String,
        /// Whether visitor data was carried into the new session
        promoted: bool,
    },
    SessionExtended {
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    },
    SessionExpired(SessionId),
    SessionEnded(SessionId),
}

impl Event {
    /// Stable name for logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            Event::UniqueVisitor(_) => "unique_visitor",
            Event::PageView(_) => "page_view",
            Event::SessionCreated { .. } => "session_created",
            Event::SessionExtended { .. } => "session_extended",
            Event::SessionExpired(_) => "session_expired",
            Event::SessionEnded(_) => "session_ended",
        }
    }
}

/// A trait for handling events emitted by the event bus
///
/// Implementors of this trait can be registered with the [`EventBus`] to receive and process events.
/// The handler is called asynchronously for each event emitted.
///
/// # Examples
///
/// ```
/// # use assay_core::events::{Event, EventHandler};
/// # use assay_core::error::EventError;
/// # use async_trait::async_trait;
/// struct MetricsHandler;
///
/// #[async_trait]
/// impl EventHandler for MetricsHandler {
///     async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
///         println!("{}", event.name());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError>;
}

/// Event bus that can emit events and register event handlers
///
/// Handlers are called in registration order. Emission stops at the first
/// handler error, which is returned to the caller.
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an event handler with the event bus
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Emit an event to all registered handlers
    pub async fn emit(&self, event: &Event) -> Result<(), EventError> {
        for handler in self.handlers.read().await.iter() {
            handler.handle_event(event).await?;
        }

        Ok(())
    }

    /// Emit an event, logging rather than returning any handler failure
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.emit(&event).await {
            tracing::warn!(event = event.name(), error = %e, "Failed to deliver event");
        }
    }
}
