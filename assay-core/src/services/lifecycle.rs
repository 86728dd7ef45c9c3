//! Per-request session resolution
//!
//! [`SessionLifecycleService::resolve`] decides, for one request, whether the
//! session cookie points at a valid authenticated session. Requests that are
//! not authenticated are handed to visitor tracking. The outcome also carries
//! the one cookie action the response must apply.
//!
//! Resolution fails closed: any error on the way is logged and the request is
//! treated as unauthenticated.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    Error,
    config::SessionConfig,
    error::SessionError,
    events::{Event, EventBus},
    request::RequestContext,
    services::visitor::VisitorService,
    session::{
        CookieDecision, Credentials, SessionId, SessionOutcome, SessionRecord, SessionUser,
        TokenRefreshHook,
        validator::{self, RecordState},
    },
    storage::SessionStore,
};

/// Service tying the validator, visitor tracking and refresh hook together
pub struct SessionLifecycleService<S: SessionStore> {
    store: Arc<S>,
    visitors: VisitorService<S>,
    refresh_hook: Option<Arc<dyn TokenRefreshHook>>,
    events: EventBus,
    config: SessionConfig,
}

impl<S: SessionStore> SessionLifecycleService<S> {
    pub fn new(store: Arc<S>, events: EventBus, config: SessionConfig) -> Self {
        let visitors = VisitorService::new(store.clone(), events.clone(), config.clone());
        Self {
            store,
            visitors,
            refresh_hook: None,
            events,
            config,
        }
    }

    pub fn with_refresh_hook(mut self, hook: Arc<dyn TokenRefreshHook>) -> Self {
        self.refresh_hook = Some(hook);
        self
    }

    pub fn visitors(&self) -> &VisitorService<S> {
        &self.visitors
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolve the session reference carried by a request
    ///
    /// Never fails: every internal error resolves to an unauthenticated outcome.
    pub async fn resolve(
        &self,
        session_ref: Option<&SessionId>,
        request: &RequestContext,
    ) -> SessionOutcome {
        match self.try_resolve(session_ref, request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(path = %request.path, error = %e, "Session resolution failed, treating request as unauthenticated");
                SessionOutcome::unauthenticated()
            }
        }
    }

    async fn try_resolve(
        &self,
        session_ref: Option<&SessionId>,
        request: &RequestContext,
    ) -> Result<SessionOutcome, Error> {
        let Some(session_id) = session_ref else {
            return Ok(self.track_new_visitor(request).await);
        };

        let current = match self.store.get(session_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(session_id = %session_id, "Session not found");
                return Ok(self.track_new_visitor(request).await);
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Session lookup failed, treating as not found");
                return Ok(self.track_new_visitor(request).await);
            }
        };

        let now = Utc::now();
        let state = validator::classify(&current, now, self.config.extension_threshold);

        let record = match state {
            RecordState::Unusable => {
                return Ok(self.track_existing_visitor(session_id, current, request).await);
            }
            RecordState::Expired => {
                if let Err(e) = self.store.delete(session_id).await {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to drop expired session");
                }
                tracing::debug!(session_id = %session_id, "Session expired");
                self.events
                    .publish(Event::SessionExpired(session_id.clone()))
                    .await;
                return Ok(SessionOutcome::unauthenticated());
            }
            RecordState::NeedsExtension => {
                let lifetime = self.config.authenticated_lifetime;
                let extended = validator::extend(current.clone(), now, lifetime);
                self.store.set(session_id, &extended, lifetime).await?;

                tracing::debug!(session_id = %session_id, expires_at = %extended.expires_at(), "Extended session");
                self.events
                    .publish(Event::SessionExtended {
                        session_id: session_id.clone(),
                        expires_at: extended.expires_at(),
                    })
                    .await;
                extended
            }
            RecordState::Valid => current.clone(),
        };

        if let Some(hook) = &self.refresh_hook {
            let store: &dyn SessionStore = &*self.store;
            if let Some(resolution) = hook.refresh(&record, session_id, store, &current).await? {
                tracing::debug!(session_id = %session_id, valid = resolution.is_valid(), "Refresh hook replaced resolution");
                return Ok(resolution.into());
            }
        }

        let credentials =
            Credentials::from_record(session_id, &record).ok_or(SessionError::NotAuthenticated)?;
        Ok(SessionOutcome::authenticated(credentials))
    }

    async fn track_new_visitor(&self, request: &RequestContext) -> SessionOutcome {
        if !self.visitors.should_track_path(&request.path) {
            return SessionOutcome::unauthenticated();
        }

        match self.visitors.create_visitor(request).await {
            Some(outcome) => SessionOutcome::unauthenticated()
                .with_cookie(CookieDecision::Issue(outcome.session_id)),
            None => SessionOutcome::unauthenticated(),
        }
    }

    async fn track_existing_visitor(
        &self,
        session_id: &SessionId,
        record: SessionRecord,
        request: &RequestContext,
    ) -> SessionOutcome {
        if record.visitor().is_none() {
            return self.track_new_visitor(request).await;
        }

        if validator::is_expired(&record, Utc::now()) {
            if let Err(e) = self.store.delete(session_id).await {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to drop expired visitor session");
            }
            tracing::debug!(session_id = %session_id, "Visitor session expired");
            return self.track_new_visitor(request).await;
        }

        if self.visitors.should_track_path(&request.path) {
            // the client already holds this id, so no cookie is issued
            self.visitors
                .update_visitor(session_id.clone(), record, request)
                .await;
        }
        SessionOutcome::unauthenticated()
    }

    /// Establish an authenticated session for `user`
    ///
    /// A fresh session id is always minted. Visitor data found under
    /// `session_ref` is carried into the new record and the old record is
    /// removed.
    pub async fn sign_in(
        &self,
        session_ref: Option<&SessionId>,
        user: SessionUser,
        token: Option<String>,
    ) -> Result<SessionOutcome, Error> {
        let previous = match session_ref {
            Some(session_id) => match self.store.get(session_id).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to read previous session during sign-in");
                    None
                }
            },
            None => None,
        };

        let now = Utc::now();
        let lifetime = self.config.authenticated_lifetime;
        let session_id = SessionId::new_random()?;
        let user_id = user.id.clone();

        let record = match previous {
            Some(previous) => previous.promote(session_id.clone(), user, token, now + lifetime),
            None => SessionRecord::authenticated(session_id.clone(), user, token, now + lifetime),
        };
        self.store.set(&session_id, &record, lifetime).await?;

        if let Some(old_id) = session_ref {
            if let Err(e) = self.store.delete(old_id).await {
                tracing::warn!(session_id = %old_id, error = %e, "Failed to drop previous session");
            }
        }

        let promoted = record.visitor().is_some();
        tracing::debug!(session_id = %session_id, user_id = %user_id, promoted, "Created session");
        self.events
            .publish(Event::SessionCreated {
                session_id: session_id.clone(),
                user_id,
                promoted,
            })
            .await;

        let credentials =
            Credentials::from_record(&session_id, &record).ok_or(SessionError::NotAuthenticated)?;
        Ok(SessionOutcome::authenticated(credentials).with_cookie(CookieDecision::Issue(session_id)))
    }

    /// End the session `session_ref` points at and clear the cookie
    pub async fn sign_out(&self, session_ref: Option<&SessionId>) -> Result<SessionOutcome, Error> {
        if let Some(session_id) = session_ref {
            self.store.delete(session_id).await?;
            tracing::debug!(session_id = %session_id, "Ended session");
            self.events
                .publish(Event::SessionEnded(session_id.clone()))
                .await;
        }

        Ok(SessionOutcome::unauthenticated().with_cookie(CookieDecision::Clear))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use chrono::{DateTime, Duration};

    use super::*;
    use crate::{
        error::{EventError, StorageError},
        events::EventHandler,
        session::{Resolution, Visitor, VisitorId},
        storage::MemoryStore,
    };

    /// Memory store that counts deletes and can fail each operation
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        deletes: AtomicUsize,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        fail_deletes: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for CountingStore {
        async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, Error> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::Connection("cache unreachable".to_string()).into());
            }
            self.inner.get(id).await
        }

        async fn set(
            &self,
            id: &SessionId,
            record: &SessionRecord,
            ttl: Duration,
        ) -> Result<(), Error> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Cache("read-only replica".to_string()).into());
            }
            self.inner.set(id, record, ttl).await
        }

        async fn delete(&self, id: &SessionId) -> Result<(), Error> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(StorageError::Connection("cache unreachable".to_string()).into());
            }
            self.inner.delete(id).await
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct ReplacingHook(Resolution);

    #[async_trait]
    impl TokenRefreshHook for ReplacingHook {
        async fn refresh(
            &self,
            _record: &SessionRecord,
            _session_id: &SessionId,
            _store: &dyn SessionStore,
            _current: &SessionRecord,
        ) -> Result<Option<Resolution>, Error> {
            Ok(Some(self.0.clone()))
        }
    }

    struct FailingHook;

    #[async_trait]
    impl TokenRefreshHook for FailingHook {
        async fn refresh(
            &self,
            _record: &SessionRecord,
            _session_id: &SessionId,
            _store: &dyn SessionStore,
            _current: &SessionRecord,
        ) -> Result<Option<Resolution>, Error> {
            Err(SessionError::RefreshFailed("identity provider unreachable".to_string()).into())
        }
    }

    /// Hook that records what it was given and defers to the service
    #[derive(Default)]
    struct ObservingHook {
        seen: Mutex<Option<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl TokenRefreshHook for ObservingHook {
        async fn refresh(
            &self,
            record: &SessionRecord,
            _session_id: &SessionId,
            _store: &dyn SessionStore,
            current: &SessionRecord,
        ) -> Result<Option<Resolution>, Error> {
            *self.seen.lock().unwrap() = Some((record.expires_at(), current.expires_at()));
            Ok(None)
        }
    }

    async fn service_with(
        store: Arc<CountingStore>,
    ) -> (SessionLifecycleService<CountingStore>, Arc<RecordingHandler>) {
        let events = EventBus::new();
        let handler = Arc::new(RecordingHandler::default());
        events.register(handler.clone()).await;
        (
            SessionLifecycleService::new(store, events, SessionConfig::default()),
            handler,
        )
    }

    fn user_record(id: &SessionId, expires_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord::authenticated(
            id.clone(),
            SessionUser::new("u1").with_role("admin"),
            Some("Bearer abc".to_string()),
            expires_at,
        )
    }

    fn request(path: &str) -> RequestContext {
        RequestContext::new(path).with_user_agent("Mozilla/5.0")
    }

    #[tokio::test]
    async fn test_valid_session_is_authenticated() {
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;
        let id = SessionId::new("ses_1");
        let expires_at = Utc::now() + Duration::hours(3);
        store
            .set(&id, &user_record(&id, expires_at), Duration::hours(3))
            .await
            .unwrap();

        let outcome = service.resolve(Some(&id), &request("/projects")).await;

        let credentials = outcome.resolution.credentials().expect("authenticated");
        assert_eq!(credentials.session_id, id);
        assert_eq!(credentials.token.as_deref(), Some("abc"));
        assert_eq!(credentials.expires_at, expires_at);
        assert!(credentials.user.has_role("admin"));
        assert_eq!(outcome.cookie, CookieDecision::Keep);
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped_once() {
        let store = Arc::new(CountingStore::default());
        let (service, handler) = service_with(store.clone()).await;
        let id = SessionId::new("ses_1");
        store
            .set(
                &id,
                &user_record(&id, Utc::now() - Duration::milliseconds(1000)),
                Duration::hours(1),
            )
            .await
            .unwrap();

        let outcome = service.resolve(Some(&id), &request("/projects")).await;

        assert_eq!(outcome, SessionOutcome::unauthenticated());
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
        assert!(store.get(&id).await.unwrap().is_none());
        assert_eq!(
            handler.events.lock().unwrap().as_slice(),
            &[Event::SessionExpired(id)]
        );
    }

    #[tokio::test]
    async fn test_session_near_expiry_is_extended() {
        let store = Arc::new(CountingStore::default());
        let (service, handler) = service_with(store.clone()).await;
        let id = SessionId::new("ses_1");
        let original = user_record(&id, Utc::now() + Duration::minutes(10));
        store.set(&id, &original, Duration::minutes(10)).await.unwrap();

        let before = Utc::now();
        let outcome = service.resolve(Some(&id), &request("/projects")).await;
        let after = Utc::now();

        assert!(outcome.resolution.is_valid());
        let stored = store.get(&id).await.unwrap().unwrap();
        assert!(stored.expires_at() >= before + Duration::hours(4));
        assert!(stored.expires_at() <= after + Duration::hours(4));
        assert_eq!(stored.user(), original.user());
        assert_eq!(stored.token(), original.token());
        assert!(matches!(
            handler.events.lock().unwrap().as_slice(),
            [Event::SessionExtended { .. }]
        ));
    }

    #[tokio::test]
    async fn test_failed_extension_fails_closed() {
        let _ = tracing_subscriber::fmt().try_init();
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;
        let id = SessionId::new("ses_1");
        store
            .set(
                &id,
                &user_record(&id, Utc::now() + Duration::minutes(10)),
                Duration::minutes(10),
            )
            .await
            .unwrap();
        store.fail_writes.store(true, Ordering::SeqCst);

        let outcome = service.resolve(Some(&id), &request("/projects")).await;
        assert_eq!(outcome, SessionOutcome::unauthenticated());
    }

    #[tokio::test]
    async fn test_refresh_hook_result_is_authoritative() {
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;
        let service = service.with_refresh_hook(Arc::new(ReplacingHook(Resolution::Unauthenticated)));
        let id = SessionId::new("ses_1");
        store
            .set(&id, &user_record(&id, Utc::now() + Duration::hours(3)), Duration::hours(3))
            .await
            .unwrap();

        let outcome = service.resolve(Some(&id), &request("/projects")).await;
        assert!(!outcome.resolution.is_valid());
    }

    #[tokio::test]
    async fn test_refresh_hook_error_fails_closed() {
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;
        let service = service.with_refresh_hook(Arc::new(FailingHook));
        let id = SessionId::new("ses_1");
        store
            .set(&id, &user_record(&id, Utc::now() + Duration::hours(3)), Duration::hours(3))
            .await
            .unwrap();

        let outcome = service.resolve(Some(&id), &request("/projects")).await;
        assert_eq!(outcome, SessionOutcome::unauthenticated());
    }

    #[tokio::test]
    async fn test_refresh_hook_sees_extended_and_current_records() {
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;
        let hook = Arc::new(ObservingHook::default());
        let service = service.with_refresh_hook(hook.clone());
        let id = SessionId::new("ses_1");
        let original_expiry = Utc::now() + Duration::minutes(10);
        store
            .set(&id, &user_record(&id, original_expiry), Duration::minutes(10))
            .await
            .unwrap();

        let outcome = service.resolve(Some(&id), &request("/projects")).await;

        assert!(outcome.resolution.is_valid());
        let seen = *hook.seen.lock().unwrap();
        let (extended, current) = seen.expect("hook called");
        assert_eq!(current, original_expiry);
        assert!(extended > original_expiry);
    }

    #[tokio::test]
    async fn test_no_reference_on_untracked_path() {
        let store = Arc::new(CountingStore::default());
        let (service, handler) = service_with(store.clone()).await;

        let outcome = service.resolve(None, &request("/health")).await;

        assert_eq!(outcome, SessionOutcome::unauthenticated());
        assert!(store.inner.is_empty());
        assert!(handler.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_reference_issues_visitor_cookie() {
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;

        let outcome = service.resolve(None, &request("/projects")).await;

        assert!(!outcome.resolution.is_valid());
        let CookieDecision::Issue(session_id) = outcome.cookie else {
            panic!("expected a new visitor cookie");
        };
        let stored = store.get(&session_id).await.unwrap().unwrap();
        assert!(stored.visitor().is_some());
    }

    #[tokio::test]
    async fn test_visitor_record_is_never_authenticated() {
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;
        let id = SessionId::new("ses_1");
        let now = Utc::now();
        let record = SessionRecord::new_visitor(
            id.clone(),
            Visitor::new(VisitorId::new("vis_1"), now, None, None),
            now + Duration::hours(24),
        );
        store.set(&id, &record, Duration::hours(24)).await.unwrap();

        let outcome = service.resolve(Some(&id), &request("/projects")).await;

        assert!(!outcome.resolution.is_valid());
        assert_eq!(outcome.cookie, CookieDecision::Keep);
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.visitor().unwrap().page_views, 1);
    }

    #[tokio::test]
    async fn test_store_read_failure_counts_as_not_found() {
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;
        let id = SessionId::new("ses_1");
        store
            .set(&id, &user_record(&id, Utc::now() + Duration::hours(3)), Duration::hours(3))
            .await
            .unwrap();
        store.fail_reads.store(true, Ordering::SeqCst);

        let outcome = service.resolve(Some(&id), &request("/projects")).await;

        assert!(!outcome.resolution.is_valid());
        assert!(outcome.resolution.credentials().is_none());
        let CookieDecision::Issue(session_id) = outcome.cookie else {
            panic!("expected a new visitor cookie");
        };
        assert_ne!(session_id, id);

        store.fail_reads.store(false, Ordering::SeqCst);
        assert!(store.get(&session_id).await.unwrap().unwrap().visitor().is_some());
    }

    #[tokio::test]
    async fn test_expired_visitor_record_is_replaced() {
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;
        let id = SessionId::new("ses_1");
        let then = Utc::now() - Duration::hours(30);
        let record = SessionRecord::new_visitor(
            id.clone(),
            Visitor::new(VisitorId::new("vis_1"), then, None, None),
            then + Duration::hours(24),
        );
        store.set(&id, &record, Duration::hours(24)).await.unwrap();

        let outcome = service.resolve(Some(&id), &request("/projects")).await;

        assert!(!outcome.resolution.is_valid());
        let CookieDecision::Issue(session_id) = outcome.cookie else {
            panic!("expected a new visitor cookie");
        };
        assert_ne!(session_id, id);
        assert!(store.get(&id).await.unwrap().is_none());

        let fresh = store.get(&session_id).await.unwrap().unwrap();
        assert_ne!(fresh.visitor().unwrap().id, VisitorId::new("vis_1"));
        assert!(fresh.expires_at() > Utc::now());
    }

    #[tokio::test]
    async fn test_sign_in_promotes_visitor() {
        let store = Arc::new(CountingStore::default());
        let (service, handler) = service_with(store.clone()).await;

        let visit = service.resolve(None, &request("/projects")).await;
        let CookieDecision::Issue(visitor_session) = visit.cookie else {
            panic!("expected a new visitor cookie");
        };
        let visitor = store
            .get(&visitor_session)
            .await
            .unwrap()
            .unwrap()
            .visitor()
            .cloned();

        let outcome = service
            .sign_in(
                Some(&visitor_session),
                SessionUser::new("u1"),
                Some("Bearer xyz".to_string()),
            )
            .await
            .unwrap();

        let CookieDecision::Issue(session_id) = outcome.cookie.clone() else {
            panic!("expected a session cookie");
        };
        assert_ne!(session_id, visitor_session);
        assert!(store.get(&visitor_session).await.unwrap().is_none());

        let stored = store.get(&session_id).await.unwrap().unwrap();
        assert!(matches!(stored, SessionRecord::Promoted(_)));
        assert_eq!(stored.visitor().cloned(), visitor);

        let credentials = outcome.resolution.credentials().unwrap();
        assert_eq!(credentials.token.as_deref(), Some("xyz"));

        let resolved = service.resolve(Some(&session_id), &request("/projects")).await;
        assert!(resolved.resolution.is_valid());

        assert!(handler.events.lock().unwrap().iter().any(|event| matches!(
            event,
            Event::SessionCreated { promoted: true, .. }
        )));
    }

    #[tokio::test]
    async fn test_sign_out_clears_cookie() {
        let store = Arc::new(CountingStore::default());
        let (service, _) = service_with(store.clone()).await;

        let signed_in = service
            .sign_in(None, SessionUser::new("u1"), None)
            .await
            .unwrap();
        let CookieDecision::Issue(session_id) = signed_in.cookie else {
            panic!("expected a session cookie");
        };

        let outcome = service.sign_out(Some(&session_id)).await.unwrap();

        assert_eq!(outcome.cookie, CookieDecision::Clear);
        assert!(store.get(&session_id).await.unwrap().is_none());

        // signing out twice is harmless
        service.sign_out(Some(&session_id)).await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_out_reports_store_failure() {
        let store = Arc::new(CountingStore::default());
        let (service, handler) = service_with(store.clone()).await;
        let id = SessionId::new("ses_1");
        store
            .set(&id, &user_record(&id, Utc::now() + Duration::hours(3)), Duration::hours(3))
            .await
            .unwrap();
        store.fail_deletes.store(true, Ordering::SeqCst);

        let result = service.sign_out(Some(&id)).await;

        assert!(matches!(result, Err(Error::Storage(StorageError::Connection(_)))));
        assert!(store.get(&id).await.unwrap().is_some());
        assert!(handler.events.lock().unwrap().is_empty());
    }
}
