//! Session lifecycle configuration

use chrono::Duration;

use crate::session::validator::{DEFAULT_AUTHENTICATED_LIFETIME, DEFAULT_EXTENSION_THRESHOLD};

/// Lifetime of a visitor session after its latest page view.
pub const DEFAULT_VISITOR_LIFETIME: Duration = Duration::hours(24);

/// Path prefixes that never create or update visitor sessions.
pub const DEFAULT_UNTRACKED_PREFIXES: &[&str] = &[
    "/public/",
    "/favicon.ico",
    "/robots.txt",
    "/health",
    "/_next/",
    "/api/health",
];

/// Configuration for session lifetimes and visitor tracking.
///
/// # Example
///
/// ```rust
/// use assay_core::SessionConfig;
/// use chrono::Duration;
///
/// let config = SessionConfig::default()
///     .with_authenticated_lifetime(Duration::hours(8))
///     .with_untracked_prefix("/metrics");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Remaining lifetime under which an authenticated session is extended
    pub extension_threshold: Duration,
    /// Lifetime granted at sign-in and on every extension
    pub authenticated_lifetime: Duration,
    /// Lifetime of a visitor session after each tracked page view
    pub visitor_lifetime: Duration,
    pub untracked_prefixes: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            extension_threshold: DEFAULT_EXTENSION_THRESHOLD,
            authenticated_lifetime: DEFAULT_AUTHENTICATED_LIFETIME,
            visitor_lifetime: DEFAULT_VISITOR_LIFETIME,
            untracked_prefixes: DEFAULT_UNTRACKED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
        }
    }
}

impl SessionConfig {
    pub fn with_extension_threshold(mut self, threshold: Duration) -> Self {
        self.extension_threshold = threshold;
        self
    }

    pub fn with_authenticated_lifetime(mut self, lifetime: Duration) -> Self {
        self.authenticated_lifetime = lifetime;
        self
    }

    pub fn with_visitor_lifetime(mut self, lifetime: Duration) -> Self {
        self.visitor_lifetime = lifetime;
        self
    }

    /// Add a path prefix excluded from visitor tracking
    pub fn with_untracked_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.untracked_prefixes.push(prefix.into());
        self
    }
}
