use assay::{Credentials, SessionId};
use axum::{
    Extension, RequestPartsExt,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};

use crate::{error::AuthError, middleware::SessionReference};

/// Credentials of an authenticated request; rejects with 401 otherwise.
pub struct AuthUser(pub Credentials);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Extension(credentials): Extension<Credentials> =
            parts.extract().await.map_err(|_| AuthError::Unauthorized)?;

        Ok(AuthUser(credentials))
    }
}

pub struct OptionalAuthUser(pub Option<Credentials>);

impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let credentials = parts.extensions.get::<Credentials>().cloned();

        Ok(OptionalAuthUser(credentials))
    }
}

/// The session id the request carries, or the visitor id just issued to it
pub struct SessionIdFromCookie(pub Option<SessionId>);

impl<S> FromRequestParts<S> for SessionIdFromCookie
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session_id = parts
            .extensions
            .get::<SessionReference>()
            .and_then(|reference| reference.0.clone());

        Ok(SessionIdFromCookie(session_id))
    }
}
