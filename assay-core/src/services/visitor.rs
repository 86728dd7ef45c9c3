//! Anonymous visitor tracking
//!
//! Every tracked page view either updates the visitor session the browser
//! already has or mints a new one. Tracking is best-effort: failures are logged
//! and reported as `None`, never returned to the request.
//!
//! Two requests racing with the same unknown session reference can both mint a
//! visitor. Visitor counts are approximate and this is accepted.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    Error,
    config::SessionConfig,
    events::{Event, EventBus, PageViewEvent},
    request::RequestContext,
    session::{SessionId, SessionRecord, Visitor, VisitorId, validator},
    storage::SessionStore,
};

/// `true` unless `path` starts with one of `untracked_prefixes`
pub fn should_track_path<P: AsRef<str>>(path: &str, untracked_prefixes: &[P]) -> bool {
    !untracked_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_ref()))
}

/// A visitor session after a tracked page view
#[derive(Debug, Clone, PartialEq)]
pub struct VisitorOutcome {
    pub session_id: SessionId,
    pub record: SessionRecord,
    /// `true` when the session id was minted by this call
    pub created: bool,
}

/// Service for visitor session management
pub struct VisitorService<S: SessionStore> {
    store: Arc<S>,
    events: EventBus,
    config: SessionConfig,
}

impl<S: SessionStore> VisitorService<S> {
    pub fn new(store: Arc<S>, events: EventBus, config: SessionConfig) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    pub fn should_track_path(&self, path: &str) -> bool {
        should_track_path(path, &self.config.untracked_prefixes)
    }

    /// Record a page view against the visitor session `session_ref` points at,
    /// or against a new visitor session if it points at nothing usable.
    pub async fn create_or_update_visitor_session(
        &self,
        session_ref: Option<&SessionId>,
        request: &RequestContext,
    ) -> Option<VisitorOutcome> {
        let existing = match session_ref {
            Some(session_id) => match self.store.get(session_id).await {
                Ok(Some(record))
                    if record.visitor().is_some() && !validator::is_expired(&record, Utc::now()) =>
                {
                    Some(record)
                }
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to read visitor session");
                    return None;
                }
            },
            None => None,
        };

        match (session_ref, existing) {
            (Some(session_id), Some(record)) => {
                self.update_visitor(session_id.clone(), record, request)
                    .await
            }
            _ => self.create_visitor(request).await,
        }
    }

    /// Record a page view on a record already known to carry visitor data
    pub async fn update_visitor(
        &self,
        session_id: SessionId,
        record: SessionRecord,
        request: &RequestContext,
    ) -> Option<VisitorOutcome> {
        match self.try_update_visitor(session_id, record, request).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to update visitor session");
                None
            }
        }
    }

    /// Mint a new visitor session for `request`
    pub async fn create_visitor(&self, request: &RequestContext) -> Option<VisitorOutcome> {
        match self.try_create_visitor(request).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(path = %request.path, error = %e, "Failed to create visitor session");
                None
            }
        }
    }

    async fn try_update_visitor(
        &self,
        session_id: SessionId,
        mut record: SessionRecord,
        request: &RequestContext,
    ) -> Result<VisitorOutcome, Error> {
        let now = Utc::now();
        let visitor_id = match record.visitor_mut() {
            Some(visitor) => {
                visitor.touch(now);
                visitor.id.clone()
            }
            None => return self.try_create_visitor(request).await,
        };

        // authenticated records keep their own expiry
        let record = if record.user().is_none() {
            record.with_expiry(now + self.config.visitor_lifetime)
        } else {
            record
        };

        self.store
            .set(&session_id, &record, record.expires_at() - now)
            .await?;

        tracing::debug!(session_id = %session_id, visitor_id = %visitor_id, "Updated visitor session");

        self.events
            .publish(Event::PageView(page_view(
                request,
                &visitor_id,
                &session_id,
                now,
            )))
            .await;

        Ok(VisitorOutcome {
            session_id,
            record,
            created: false,
        })
    }

    async fn try_create_visitor(&self, request: &RequestContext) -> Result<VisitorOutcome, Error> {
        let now = Utc::now();
        let session_id = SessionId::new_random()?;
        let visitor = Visitor::new(
            VisitorId::new_random()?,
            now,
            request.user_agent.clone(),
            request.ip_address.clone(),
        );
        let visitor_id = visitor.id.clone();
        let record = SessionRecord::new_visitor(
            session_id.clone(),
            visitor,
            now + self.config.visitor_lifetime,
        );

        self.store
            .set(&session_id, &record, self.config.visitor_lifetime)
            .await?;

        tracing::debug!(session_id = %session_id, visitor_id = %visitor_id, "Created visitor session");

        let event = page_view(request, &visitor_id, &session_id, now);
        self.events.publish(Event::UniqueVisitor(event.clone())).await;
        self.events.publish(Event::PageView(event)).await;

        Ok(VisitorOutcome {
            session_id,
            record,
            created: true,
        })
    }
}

fn page_view(
    request: &RequestContext,
    visitor_id: &VisitorId,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> PageViewEvent {
    PageViewEvent {
        path: request.path.clone(),
        user_agent: request.user_agent.clone(),
        referer: request.referer_or_direct().to_string(),
        visitor_id: visitor_id.clone(),
        session_id: session_id.clone(),
        timestamp: now,
    }
}
