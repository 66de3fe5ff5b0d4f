//! Correlation identity resolution.
//!
//! Order of precedence: identity cookie, identity header, fresh token. A
//! fresh token is written back as a cookie only while the response has not
//! started and only for requests that already carry a session, so that
//! stateless traffic (bots, health checks) is never handed an identity.

use bizevent_core::{CorrelationId, CorrelationOrigin, SessionHandle};
use tracing::debug;

use crate::context::{IdentityState, RequestContext, SetCookie};

/// Name of the cookie holding the correlation id.
pub const CORRELATION_COOKIE_NAME: &str = "__cd_732655870348746856";

/// Request header consulted when the cookie is absent (server-to-server).
pub const CORRELATION_HEADER_NAME: &str = "X_CD_732655870348746856";

/// Result of resolving identity for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub correlation_id: CorrelationId,
    /// A cookie carrying a newly generated id was queued on the response.
    pub issued_cookie: bool,
}

/// Resolve the request's correlation id, caching it on the context.
///
/// Idempotent: once resolved, later calls return the cached id and never
/// issue another cookie. After the response has started nothing new is
/// resolved and the cached id, if any, is returned.
pub fn resolve(ctx: &mut RequestContext) -> Option<Resolution> {
    match ctx.identity() {
        IdentityState::Resolved(id) => {
            return Some(Resolution {
                correlation_id: id.clone(),
                issued_cookie: false,
            })
        }
        IdentityState::ResponseStarted(id) => {
            return id.clone().map(|correlation_id| Resolution {
                correlation_id,
                issued_cookie: false,
            })
        }
        IdentityState::Unresolved => {}
    }

    let correlation_id = read_inbound(ctx).unwrap_or_else(CorrelationId::generate);
    metrics::counter!(origin_metric(correlation_id.origin())).increment(1);

    let issued_cookie = correlation_id.is_generated()
        && ctx.session().is_some()
        && ctx.set_cookie(SetCookie {
            name: CORRELATION_COOKIE_NAME.to_string(),
            value: correlation_id.as_str().to_string(),
            path: "/".to_string(),
        });

    if correlation_id.is_generated() && !issued_cookie {
        debug!(
            correlation_id = %correlation_id,
            "Generated correlation id without a session, not persisted"
        );
    }

    if let Some(session) = ctx.session() {
        record_on_session(session, &correlation_id);
    }

    debug!(
        correlation_id = %correlation_id,
        origin = correlation_id.origin().as_str(),
        issued_cookie = issued_cookie,
        "Correlation id resolved"
    );

    ctx.resolve_identity(correlation_id.clone());
    Some(Resolution {
        correlation_id,
        issued_cookie,
    })
}

fn read_inbound(ctx: &RequestContext) -> Option<CorrelationId> {
    let request = ctx.request();
    let inbound = |value: Option<&str>, origin: CorrelationOrigin| {
        let value = value.filter(|v| !v.trim().is_empty())?;
        let parsed = CorrelationId::parse(value, origin);
        if parsed.is_none() {
            debug!(
                origin = origin.as_str(),
                "Ignoring inbound correlation id that is not a digit string"
            );
        }
        parsed
    };
    inbound(request.cookie(CORRELATION_COOKIE_NAME), CorrelationOrigin::Cookie)
        .or_else(|| inbound(request.header(CORRELATION_HEADER_NAME), CorrelationOrigin::Header))
}

fn origin_metric(origin: CorrelationOrigin) -> &'static str {
    match origin {
        CorrelationOrigin::Cookie => "bizevent.identity.cookie",
        CorrelationOrigin::Header => "bizevent.identity.header",
        CorrelationOrigin::Generated => "bizevent.identity.generated",
    }
}

fn record_on_session(session: &SessionHandle, correlation_id: &CorrelationId) {
    let previous = session.state().correlation_id;
    if previous.as_deref() != Some(correlation_id.as_str()) {
        // A changed id on a live session usually means cookies are refused.
        if previous.is_some() && correlation_id.is_generated() {
            metrics::counter!("bizevent.identity.regenerated").increment(1);
            debug!(
                session_id = session.id(),
                "Correlation id regenerated for an existing session"
            );
        }
        session.record_correlation_id(correlation_id.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InboundRequest;
    use bizevent_core::InMemorySessionStore;
    use std::sync::Arc;

    fn session() -> SessionHandle {
        SessionHandle::new("sess-1", Arc::new(InMemorySessionStore::new()))
    }

    #[test]
    fn test_cookie_wins_and_writes_nothing() {
        let request = InboundRequest::new()
            .with_cookie(CORRELATION_COOKIE_NAME, "111")
            .with_header(CORRELATION_HEADER_NAME, "222");
        let mut ctx = RequestContext::new(request, Some(session()));

        let resolution = resolve(&mut ctx).unwrap();
        assert_eq!(resolution.correlation_id.as_str(), "111");
        assert_eq!(resolution.correlation_id.origin(), CorrelationOrigin::Cookie);
        assert!(!resolution.issued_cookie);
        assert!(ctx.response_cookies().is_empty());
    }

    #[test]
    fn test_header_used_when_cookie_absent() {
        let request = InboundRequest::new().with_header(CORRELATION_HEADER_NAME, "222");
        let mut ctx = RequestContext::new(request, Some(session()));

        let resolution = resolve(&mut ctx).unwrap();
        assert_eq!(resolution.correlation_id.as_str(), "222");
        assert_eq!(resolution.correlation_id.origin(), CorrelationOrigin::Header);
        assert!(ctx.response_cookies().is_empty());
    }

    #[test]
    fn test_generated_once_per_request() {
        let mut ctx = RequestContext::new(InboundRequest::new(), Some(session()));

        let first = resolve(&mut ctx).unwrap();
        let second = resolve(&mut ctx).unwrap();
        assert!(first.issued_cookie);
        assert!(!second.issued_cookie);
        assert_eq!(first.correlation_id, second.correlation_id);
        assert_eq!(ctx.response_cookies().len(), 1);
        assert_eq!(
            ctx.response_cookies()[0].value,
            first.correlation_id.as_str()
        );
        assert_eq!(ctx.response_cookies()[0].path, "/");
    }

    #[test]
    fn test_no_cookie_without_session() {
        let mut ctx = RequestContext::new(InboundRequest::new(), None);
        let resolution = resolve(&mut ctx).unwrap();
        assert!(resolution.correlation_id.is_generated());
        assert!(!resolution.issued_cookie);
        assert!(ctx.response_cookies().is_empty());
    }

    #[test]
    fn test_nothing_resolved_after_response_started() {
        let mut ctx = RequestContext::new(InboundRequest::new(), Some(session()));
        ctx.mark_response_started();
        assert!(resolve(&mut ctx).is_none());
        assert!(ctx.response_cookies().is_empty());
    }

    #[test]
    fn test_blank_cookie_is_ignored() {
        let request = InboundRequest::new().with_cookie(CORRELATION_COOKIE_NAME, "  ");
        let mut ctx = RequestContext::new(request, Some(session()));
        let resolution = resolve(&mut ctx).unwrap();
        assert!(resolution.correlation_id.is_generated());
    }

    #[test]
    fn test_non_digit_ids_are_not_trusted() {
        let request = InboundRequest::new()
            .with_cookie(CORRELATION_COOKIE_NAME, "../admin")
            .with_header(CORRELATION_HEADER_NAME, "333");
        let mut ctx = RequestContext::new(request, Some(session()));
        let resolution = resolve(&mut ctx).unwrap();
        assert_eq!(resolution.correlation_id.as_str(), "333");
        assert_eq!(resolution.correlation_id.origin(), CorrelationOrigin::Header);

        let request = InboundRequest::new().with_header(CORRELATION_HEADER_NAME, "1?x=y");
        let mut ctx = RequestContext::new(request, Some(session()));
        let resolution = resolve(&mut ctx).unwrap();
        assert!(resolution.correlation_id.is_generated());
        assert!(resolution.issued_cookie);
    }
}
