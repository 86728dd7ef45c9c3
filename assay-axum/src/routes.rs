use assay::SessionStore;
use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    error::{AuthError, Result},
    extractors::{OptionalAuthUser, SessionIdFromCookie},
    middleware::AuthState,
    types::*,
};

/// Session routes, to be served beneath [`session_middleware`](crate::session_middleware)
pub fn create_router<S>(state: AuthState<S>) -> Router
where
    S: SessionStore,
{
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route(
            "/session",
            get(get_session_handler).delete(logout_handler::<S>),
        )
        .route(
            "/logout",
            post(logout_handler::<S>).delete(logout_handler::<S>),
        )
        .with_state(state)
}

async fn health_handler<S>(State(state): State<AuthState<S>>) -> Result<impl IntoResponse>
where
    S: SessionStore,
{
    state.assay.health_check().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn get_session_handler(
    OptionalAuthUser(credentials): OptionalAuthUser,
) -> Result<impl IntoResponse> {
    let credentials = credentials.ok_or(AuthError::Unauthorized)?;
    Ok(Json(SessionResponse::from(&credentials)))
}

async fn logout_handler<S>(
    State(state): State<AuthState<S>>,
    SessionIdFromCookie(session_id): SessionIdFromCookie,
) -> Result<impl IntoResponse>
where
    S: SessionStore,
{
    let cookie = state.sign_out(session_id.as_ref()).await?;

    Ok((
        cookie,
        Json(MessageResponse {
            message: "Successfully logged out".to_string(),
        }),
    ))
}
