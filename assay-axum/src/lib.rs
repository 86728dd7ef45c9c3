//! # Assay Axum Integration
//!
//! This crate provides Axum middleware, extractors and routes for the Assay
//! session framework.
//!
//! [`session_middleware`] resolves the session cookie of every request,
//! tracks anonymous visitors and writes the session cookie back when the
//! lifecycle decides to issue or clear it. [`require_auth`] redirects requests
//! without an authenticated session to the login page.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use assay::{AssayBuilder, MemoryStore};
//! use assay_axum::{AuthState, AuthUser, CookieConfig, require_auth, routes, with_sessions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let assay = Arc::new(AssayBuilder::new().with_memory_store().build().await?);
//!     let state = AuthState::new(assay)
//!         .with_cookie_config(CookieConfig::development())
//!         .with_login_path("/login");
//!
//!     let protected = Router::new()
//!         .route("/dashboard", get(dashboard))
//!         .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth::<MemoryStore>));
//!
//!     let app = Router::new()
//!         .merge(protected)
//!         .route("/", get(|| async { "Welcome" }))
//!         .nest("/auth", routes(state.clone()));
//!     let app = with_sessions(app, state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//!
//! async fn dashboard(AuthUser(credentials): AuthUser) -> String {
//!     format!("Hello, {}", credentials.user.id)
//! }
//! ```

mod error;
mod extractors;
mod middleware;
mod routes;
mod types;

pub use error::{AuthError, Result};
pub use extractors::{AuthUser, OptionalAuthUser, SessionIdFromCookie};
pub use middleware::{AuthState, SessionReference, require_auth, session_middleware};
pub use routes::create_router;
pub use types::{
    CookieConfig, CookieSameSite, HealthResponse, MessageResponse, SessionCookie, SessionResponse,
};

use assay::SessionStore;
use axum::Router;

/// Create the session routes for your Axum application.
///
/// The router serves `GET /health`, `GET /session` and `POST`/`DELETE /logout`.
/// It can be nested at any path (e.g., "/auth") and must be served beneath
/// [`with_sessions`].
pub fn routes<S>(state: AuthState<S>) -> Router
where
    S: SessionStore,
{
    create_router(state)
}

/// Run every request of `router` through [`session_middleware`]
pub fn with_sessions<S>(router: Router, state: AuthState<S>) -> Router
where
    S: SessionStore,
{
    router.layer(axum::middleware::from_fn_with_state(
        state,
        session_middleware::<S>,
    ))
}
