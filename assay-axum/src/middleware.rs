use std::{net::SocketAddr, sync::Arc};

use assay::{
    Assay, CookieDecision, Credentials, RequestContext, Resolution, SessionId, SessionStore,
    SessionUser,
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use crate::{
    error::AuthError,
    types::{CookieConfig, SessionCookie},
};

/// Header consulted for the client address when running behind a proxy.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// The session id the request refers to, inserted by [`session_middleware`].
///
/// When resolution issued a new visitor session this is the issued id rather
/// than the one the cookie carried, so a sign-in on the same request promotes
/// that visitor.
#[derive(Debug, Clone, Default)]
pub struct SessionReference(pub Option<SessionId>);

pub struct AuthState<S: SessionStore> {
    pub assay: Arc<Assay<S>>,
    pub cookie_config: CookieConfig,
    /// Where [`require_auth`] sends unauthenticated requests
    pub login_path: String,
}

impl<S: SessionStore> AuthState<S> {
    pub fn new(assay: Arc<Assay<S>>) -> Self {
        Self {
            assay,
            cookie_config: CookieConfig::default(),
            login_path: "/login".to_string(),
        }
    }

    pub fn with_cookie_config(mut self, config: CookieConfig) -> Self {
        self.cookie_config = config;
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Establish an authenticated session after the identity provider returned `user`
    ///
    /// Return the [`SessionCookie`] as part of the handler's response so the
    /// new session id reaches the browser.
    pub async fn sign_in(
        &self,
        session_id: Option<&SessionId>,
        user: SessionUser,
        token: Option<String>,
    ) -> Result<(Credentials, SessionCookie), AuthError> {
        let outcome = self.assay.sign_in(session_id, user, token).await?;
        let credentials = outcome
            .resolution
            .credentials()
            .cloned()
            .ok_or_else(|| AuthError::InternalError("sign-in did not authenticate".to_string()))?;
        Ok((credentials, SessionCookie(outcome.cookie)))
    }

    /// End the session `session_id` points at
    pub async fn sign_out(&self, session_id: Option<&SessionId>) -> Result<SessionCookie, AuthError> {
        let outcome = self.assay.sign_out(session_id).await?;
        Ok(SessionCookie(outcome.cookie))
    }
}

impl<S: SessionStore> Clone for AuthState<S> {
    fn clone(&self) -> Self {
        Self {
            assay: self.assay.clone(),
            cookie_config: self.cookie_config.clone(),
            login_path: self.login_path.clone(),
        }
    }
}

/// Resolve the request's session and apply the resulting cookie decision
///
/// Inserts [`Resolution`], [`SessionReference`] and, for authenticated
/// requests, [`Credentials`] into the request extensions. A [`SessionCookie`]
/// returned by the handler takes precedence over the decision made here.
pub async fn session_middleware<S>(
    State(state): State<AuthState<S>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response
where
    S: SessionStore,
{
    let session_id = jar
        .get(&state.cookie_config.name)
        .and_then(|cookie| match SessionId::parse(cookie.value()) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed session cookie");
                None
            }
        });

    let context = request_context(&request);
    let outcome = state.assay.resolve(session_id.as_ref(), &context).await;

    if let Some(credentials) = outcome.resolution.credentials() {
        request.extensions_mut().insert(credentials.clone());
    }
    request.extensions_mut().insert(outcome.resolution);
    let reference = match &outcome.cookie {
        CookieDecision::Issue(issued) => Some(issued.clone()),
        _ => session_id,
    };
    request.extensions_mut().insert(SessionReference(reference));

    let mut response = next.run(request).await;

    let decision = response
        .extensions_mut()
        .remove::<CookieDecision>()
        .unwrap_or(outcome.cookie);

    match decision {
        CookieDecision::Keep => response,
        CookieDecision::Issue(id) => {
            let jar = jar.add(state.cookie_config.session_cookie(id.into_inner()));
            (jar, response).into_response()
        }
        CookieDecision::Clear => {
            let jar = jar.remove(state.cookie_config.removal_cookie());
            (jar, response).into_response()
        }
    }
}

/// Redirect requests without an authenticated session to the login path
///
/// Must run inside [`session_middleware`].
pub async fn require_auth<S>(
    State(state): State<AuthState<S>>,
    request: Request,
    next: Next,
) -> Response
where
    S: SessionStore,
{
    let authenticated = match request.extensions().get::<Resolution>() {
        Some(resolution) => resolution.is_valid(),
        None => {
            tracing::warn!(path = %request.uri().path(), "require_auth used without session middleware");
            false
        }
    };

    if !authenticated {
        return Redirect::to(&state.login_path).into_response();
    }

    next.run(request).await
}

fn request_context(request: &Request) -> RequestContext {
    let headers = request.headers();
    let ip_address = forwarded_for(headers).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    });

    RequestContext {
        path: request.uri().path().to_string(),
        user_agent: header_value(headers, header::USER_AGENT.as_str()),
        ip_address,
        referer: header_value(headers, header::REFERER.as_str()),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// First address of the `X-Forwarded-For` chain
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_value(headers, FORWARDED_FOR)?
        .split(',')
        .map(str::trim)
        .find(|addr| !addr.is_empty())
        .map(|addr| addr.to_string())
}
