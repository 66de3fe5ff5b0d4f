//! Per-request capture context.
//!
//! Everything that used to live in process-wide flags (the resolved
//! correlation id, whether the response has started) is held here, one
//! instance per request, and threaded through the hook coordinator.

use bizevent_core::{CorrelationId, SessionHandle};
use std::collections::HashMap;

/// The parts of an inbound request that capture looks at.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    cookies: HashMap<String, String>,
    headers: HashMap<String, String>,
    /// Set on the relay's own loop-back requests.
    pub is_local_request: bool,
    /// Request targets the administrative area.
    pub is_admin: bool,
    pub route_name: Option<String>,
    pub page_identifier: Option<String>,
}

impl InboundRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_route(mut self, route_name: impl Into<String>) -> Self {
        self.route_name = Some(route_name.into());
        self
    }

    pub fn with_page_identifier(mut self, page_identifier: impl Into<String>) -> Self {
        self.page_identifier = Some(page_identifier.into());
        self
    }

    pub fn local_relay(mut self) -> Self {
        self.is_local_request = true;
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A cookie the host must attach to its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: String,
}

impl SetCookie {
    /// `Set-Cookie` header value. Domain, Secure, HttpOnly and Max-Age are
    /// left to the browser's defaults.
    pub fn header_value(&self) -> String {
        format!("{}={}; Path={}", self.name, self.value, self.path)
    }
}

/// Identity lifecycle within one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    Unresolved,
    Resolved(CorrelationId),
    /// Response bytes may already be on the wire; cookies are frozen.
    ResponseStarted(Option<CorrelationId>),
}

#[derive(Debug)]
pub struct RequestContext {
    request: InboundRequest,
    session: Option<SessionHandle>,
    identity: IdentityState,
    response_cookies: Vec<SetCookie>,
}

impl RequestContext {
    pub fn new(request: InboundRequest, session: Option<SessionHandle>) -> Self {
        Self {
            request,
            session,
            identity: IdentityState::Unresolved,
            response_cookies: Vec::new(),
        }
    }

    pub fn request(&self) -> &InboundRequest {
        &self.request
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn identity(&self) -> &IdentityState {
        &self.identity
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match &self.identity {
            IdentityState::Unresolved => None,
            IdentityState::Resolved(id) => Some(id),
            IdentityState::ResponseStarted(id) => id.as_ref(),
        }
    }

    pub fn response_started(&self) -> bool {
        matches!(self.identity, IdentityState::ResponseStarted(_))
    }

    /// Cookies to attach to the response.
    pub fn response_cookies(&self) -> &[SetCookie] {
        &self.response_cookies
    }

    pub(crate) fn resolve_identity(&mut self, id: CorrelationId) {
        if matches!(self.identity, IdentityState::Unresolved) {
            self.identity = IdentityState::Resolved(id);
        }
    }

    /// Freeze cookies. Repeated calls keep the first frozen state.
    pub(crate) fn mark_response_started(&mut self) {
        let id = match &self.identity {
            IdentityState::Unresolved => None,
            IdentityState::Resolved(id) => Some(id.clone()),
            IdentityState::ResponseStarted(_) => return,
        };
        self.identity = IdentityState::ResponseStarted(id);
    }

    /// Queue a cookie write. Returns false once the response has started.
    pub(crate) fn set_cookie(&mut self, cookie: SetCookie) -> bool {
        if self.response_started() {
            return false;
        }
        self.response_cookies.push(cookie);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizevent_core::CorrelationOrigin;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = InboundRequest::new().with_header("X_CD_Token", "42");
        assert_eq!(request.header("x_cd_token"), Some("42"));
        assert_eq!(request.header("X_CD_TOKEN"), Some("42"));
        assert!(request.cookie("X_CD_Token").is_none());
    }

    #[test]
    fn test_response_started_freezes_cookies() {
        let mut ctx = RequestContext::new(InboundRequest::new(), None);
        ctx.resolve_identity(CorrelationId::new("1", CorrelationOrigin::Generated));
        ctx.mark_response_started();
        assert!(ctx.response_started());
        assert_eq!(ctx.correlation_id().map(|c| c.as_str()), Some("1"));

        let written = ctx.set_cookie(SetCookie {
            name: "c".into(),
            value: "v".into(),
            path: "/".into(),
        });
        assert!(!written);
        assert!(ctx.response_cookies().is_empty());

        // Later resolutions cannot replace the frozen identity.
        ctx.resolve_identity(CorrelationId::new("2", CorrelationOrigin::Generated));
        assert_eq!(ctx.correlation_id().map(|c| c.as_str()), Some("1"));
    }

    #[test]
    fn test_set_cookie_header_value() {
        let cookie = SetCookie {
            name: "__cd".into(),
            value: "123".into(),
            path: "/".into(),
        };
        assert_eq!(cookie.header_value(), "__cd=123; Path=/");
    }
}
