//! Session management
//!
//! This module contains the session record model and related functionality.
//!
//! A session record lives in the session store under an opaque [`SessionId`]; the
//! browser only holds that id in a cookie. The record is the sole source of
//! truth for authentication decisions and comes in three shapes:
//!
//! | Variant         | `user` | `visitor` | Created by                                   |
//! | --------------- | ------ | --------- | -------------------------------------------- |
//! | `Authenticated` | yes    | no        | sign-in without prior visitor tracking       |
//! | `Visitor`       | no     | yes       | first tracked anonymous page view            |
//! | `Promoted`      | yes    | yes       | sign-in from a browser that was a visitor    |

pub mod refresh;
pub mod validator;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::ValidationError,
    id::{DEFAULT_ID_BYTES, generate_prefixed_id, validate_prefixed_id},
};

pub use refresh::TokenRefreshHook;

const SESSION_ID_PREFIX: &str = "ses";
const VISITOR_ID_PREFIX: &str = "vis";
const BEARER_PREFIX: &str = "Bearer ";

/// Opaque identifier of a session record, carried by the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing id without checking its format
    pub fn new(id: &str) -> Self {
        SessionId(id.to_string())
    }

    /// Mint a new random session id
    pub fn new_random() -> Result<Self, Error> {
        Ok(SessionId(generate_prefixed_id(
            SESSION_ID_PREFIX,
            DEFAULT_ID_BYTES,
        )?))
    }

    /// Parse an id received from a client, rejecting anything we could not have minted
    pub fn parse(id: &str) -> Result<Self, ValidationError> {
        if validate_prefixed_id(id, SESSION_ID_PREFIX) {
            Ok(SessionId(id.to_string()))
        } else {
            Err(ValidationError::InvalidSessionId(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anonymous identity of a browser, stable across its visitor sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(String);

impl VisitorId {
    pub fn new(id: &str) -> Self {
        VisitorId(id.to_string())
    }

    pub fn new_random() -> Result<Self, Error> {
        Ok(VisitorId(generate_prefixed_id(
            VISITOR_ID_PREFIX,
            DEFAULT_ID_BYTES,
        )?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VisitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity payload of an authenticated session, as handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Role names. A payload without roles has none; nothing is granted by default.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl SessionUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
            roles: BTreeSet::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Anonymous page-view tracking data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
    pub id: VisitorId,
    pub first_visit: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Page views recorded after the visit that created the visitor.
    pub page_views: u64,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl Visitor {
    pub fn new(
        id: VisitorId,
        now: DateTime<Utc>,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Self {
        Self {
            id,
            first_visit: now,
            last_activity: now,
            page_views: 0,
            user_agent,
            ip_address,
        }
    }

    /// Record one more page view at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.page_views += 1;
        self.last_activity = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub id: SessionId,
    pub user: SessionUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorSession {
    pub id: SessionId,
    pub visitor: Visitor,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotedSession {
    pub id: SessionId,
    pub user: SessionUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub visitor: Visitor,
    pub expires_at: DateTime<Utc>,
}

/// A session record as held by the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionRecord {
    Authenticated(AuthenticatedSession),
    Visitor(VisitorSession),
    Promoted(PromotedSession),
}

impl SessionRecord {
    /// Build a fresh authenticated record
    pub fn authenticated(
        id: SessionId,
        user: SessionUser,
        token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        SessionRecord::Authenticated(AuthenticatedSession {
            id,
            user,
            token,
            expires_at,
        })
    }

    /// Build a fresh visitor-only record
    pub fn new_visitor(id: SessionId, visitor: Visitor, expires_at: DateTime<Utc>) -> Self {
        SessionRecord::Visitor(VisitorSession {
            id,
            visitor,
            expires_at,
        })
    }

    /// Merge an authenticated identity into this record under a new id.
    ///
    /// Visitor data, if any, is carried over unchanged. Any previous user and
    /// token are replaced.
    pub fn promote(
        self,
        id: SessionId,
        user: SessionUser,
        token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        match self.into_visitor() {
            Some(visitor) => SessionRecord::Promoted(PromotedSession {
                id,
                user,
                token,
                visitor,
                expires_at,
            }),
            None => SessionRecord::authenticated(id, user, token, expires_at),
        }
    }

    pub fn id(&self) -> &SessionId {
        match self {
            SessionRecord::Authenticated(s) => &s.id,
            SessionRecord::Visitor(s) => &s.id,
            SessionRecord::Promoted(s) => &s.id,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        match self {
            SessionRecord::Authenticated(s) => s.expires_at,
            SessionRecord::Visitor(s) => s.expires_at,
            SessionRecord::Promoted(s) => s.expires_at,
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            SessionRecord::Authenticated(s) => Some(&s.user),
            SessionRecord::Visitor(_) => None,
            SessionRecord::Promoted(s) => Some(&s.user),
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            SessionRecord::Authenticated(s) => s.token.as_deref(),
            SessionRecord::Visitor(_) => None,
            SessionRecord::Promoted(s) => s.token.as_deref(),
        }
    }

    pub fn visitor(&self) -> Option<&Visitor> {
        match self {
            SessionRecord::Authenticated(_) => None,
            SessionRecord::Visitor(s) => Some(&s.visitor),
            SessionRecord::Promoted(s) => Some(&s.visitor),
        }
    }

    pub fn visitor_mut(&mut self) -> Option<&mut Visitor> {
        match self {
            SessionRecord::Authenticated(_) => None,
            SessionRecord::Visitor(s) => Some(&mut s.visitor),
            SessionRecord::Promoted(s) => Some(&mut s.visitor),
        }
    }

    fn into_visitor(self) -> Option<Visitor> {
        match self {
            SessionRecord::Authenticated(_) => None,
            SessionRecord::Visitor(s) => Some(s.visitor),
            SessionRecord::Promoted(s) => Some(s.visitor),
        }
    }

    /// Return the same record with a new expiry; every other field is untouched
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        match &mut self {
            SessionRecord::Authenticated(s) => s.expires_at = expires_at,
            SessionRecord::Visitor(s) => s.expires_at = expires_at,
            SessionRecord::Promoted(s) => s.expires_at = expires_at,
        }
        self
    }
}

/// Strip a leading `Bearer ` from a stored credential
pub fn strip_bearer_prefix(token: &str) -> &str {
    token.strip_prefix(BEARER_PREFIX).unwrap_or(token)
}

/// What the authentication layer receives for a valid session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub session_id: SessionId,
    pub user: SessionUser,
    /// Bearer credential with any `Bearer ` prefix removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visitor: Option<Visitor>,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    /// Build credentials from a record stored under `session_id`.
    ///
    /// Returns `None` for records without an authenticated user.
    pub fn from_record(session_id: &SessionId, record: &SessionRecord) -> Option<Self> {
        let user = record.user()?;
        Some(Self {
            session_id: session_id.clone(),
            user: user.clone(),
            token: record
                .token()
                .map(|token| strip_bearer_prefix(token).to_string()),
            visitor: record.visitor().cloned(),
            expires_at: record.expires_at(),
        })
    }
}

/// Result of resolving a request's session reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Authenticated(Credentials),
    Unauthenticated,
}

impl Resolution {
    pub fn is_valid(&self) -> bool {
        matches!(self, Resolution::Authenticated(_))
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Resolution::Authenticated(credentials) => Some(credentials),
            Resolution::Unauthenticated => None,
        }
    }
}

/// The single cookie action the response phase must apply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CookieDecision {
    /// Leave whatever cookie the client holds.
    #[default]
    Keep,
    /// Set the session cookie to a newly minted session id.
    Issue(SessionId),
    /// Remove the session cookie.
    Clear,
}

/// Outcome of one pass through the session lifecycle for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub resolution: Resolution,
    pub cookie: CookieDecision,
}

impl SessionOutcome {
    pub fn unauthenticated() -> Self {
        Self {
            resolution: Resolution::Unauthenticated,
            cookie: CookieDecision::Keep,
        }
    }

    pub fn authenticated(credentials: Credentials) -> Self {
        Self {
            resolution: Resolution::Authenticated(credentials),
            cookie: CookieDecision::Keep,
        }
    }

    pub fn with_cookie(mut self, cookie: CookieDecision) -> Self {
        self.cookie = cookie;
        self
    }
}

impl From<Resolution> for SessionOutcome {
    fn from(resolution: Resolution) -> Self {
        Self {
            resolution,
            cookie: CookieDecision::Keep,
        }
    }
}
