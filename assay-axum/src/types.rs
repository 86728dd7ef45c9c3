use std::convert::Infallible;

use assay::{CookieDecision, Credentials, SessionUser};
use axum::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_views: Option<u64>,
}

impl From<&Credentials> for SessionResponse {
    fn from(credentials: &Credentials) -> Self {
        Self {
            user: credentials.user.clone(),
            expires_at: credentials.expires_at,
            page_views: credentials.visitor.as_ref().map(|v| v.page_views),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// A cookie decision made by a handler.
///
/// Returned as part of a response, it replaces the decision the session
/// middleware made for the request. Sign-in and sign-out handlers use it so
/// that a response never carries two conflicting session cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie(pub CookieDecision);

impl IntoResponseParts for SessionCookie {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self.0);
        Ok(res)
    }
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: CookieSameSite,
    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self::new("assay_session")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub enum CookieSameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl From<CookieSameSite> for SameSite {
    fn from(same_site: CookieSameSite) -> Self {
        match same_site {
            CookieSameSite::Strict => SameSite::Strict,
            CookieSameSite::Lax => SameSite::Lax,
            CookieSameSite::None => SameSite::None,
        }
    }
}

impl CookieConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            http_only: true,
            secure: true,
            same_site: CookieSameSite::Lax,
            path: "/".to_string(),
        }
    }

    /// Cookie settings for local development over plain HTTP
    pub fn development() -> Self {
        Self {
            secure: false,
            ..Self::default()
        }
    }

    /// The session cookie carrying `value`
    pub fn session_cookie(&self, value: impl Into<String>) -> Cookie<'static> {
        Cookie::build((self.name.clone(), value.into()))
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site.into())
            .build()
    }

    /// A cookie matching the session cookie's name and path, for removal
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), String::new()))
            .path(self.path.clone())
            .build()
    }
}
