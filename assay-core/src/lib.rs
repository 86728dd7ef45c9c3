//! Core functionality for the assay project
//!
//! This crate contains the session record model, the checks applied to
//! records on every request, the session store contract, and the services that
//! resolve a request's session and track anonymous visitors.
//!
//! The core crate is designed to be used as a dependency of storage backends and
//! web framework integrations; applications normally use the `assay` crate.
//!
//! See [`SessionRecord`] for the stored record, [`SessionStore`] for the storage
//! contract, and [`SessionLifecycleService`] for per-request resolution.
pub mod config;
pub mod error;
pub mod events;
pub mod id;
pub mod request;
pub mod services;
pub mod session;
pub mod storage;

pub use config::SessionConfig;
pub use error::Error;
pub use events::{Event, EventBus, EventHandler, PageViewEvent};
pub use request::RequestContext;
pub use services::{SessionLifecycleService, VisitorOutcome, VisitorService};
pub use session::{
    CookieDecision, Credentials, Resolution, SessionId, SessionOutcome, SessionRecord,
    SessionUser, TokenRefreshHook, Visitor, VisitorId,
};
pub use storage::{MemoryStore, SessionStore, TieredStore};
