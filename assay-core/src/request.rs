//! Per-request inputs to the session lifecycle

use crate::events::DIRECT_REFERER;

/// What the lifecycle needs to know about an incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Raw request path, before any routing
    pub path: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub referer: Option<String>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn referer_or_direct(&self) -> &str {
        self.referer
            .as_deref()
            .filter(|referer| !referer.is_empty())
            .unwrap_or(DIRECT_REFERER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referer_or_direct() {
        let request = RequestContext::new("/projects");
        assert_eq!(request.referer_or_direct(), "direct");

        let request = request.with_referer("https://example.gov.uk/");
        assert_eq!(request.referer_or_direct(), "https://example.gov.uk/");

        let request = RequestContext::new("/").with_referer("");
        assert_eq!(request.referer_or_direct(), "direct");
    }
}
