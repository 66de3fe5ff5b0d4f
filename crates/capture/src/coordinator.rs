//! Entry points the host calls on each observable lifecycle point.
//!
//! Per request the coordinator moves the [`RequestContext`] through
//! unresolved identity, resolved identity and response started. Events
//! within one request go out in call order, a heartbeat always ahead of the
//! organic event that triggered it.

use bizevent_core::config::AppConfig;
use bizevent_core::host::Storefront;
use bizevent_core::{Clock, CorrelationId, START_OF_SESSION};
use bizevent_transport::Transport;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::RequestContext;
use crate::dispatcher::EventDispatcher;
use crate::heartbeat::HeartbeatPolicy;
use crate::identity;
use crate::payload::{EventBuilder, HookData};

/// Event type sent when a customer logs in.
pub const CUSTOMER_LOGIN: &str = "customer_login";
/// Event type sent when a customer logs out.
pub const CUSTOMER_LOGOUT: &str = "customer_logout";

pub struct HookCoordinator {
    config: AppConfig,
    dispatcher: EventDispatcher,
    heartbeat: HeartbeatPolicy,
    clock: Arc<dyn Clock>,
}

impl HookCoordinator {
    pub fn new(
        config: AppConfig,
        storefront: Arc<dyn Storefront>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let builder = EventBuilder::new(storefront, clock.clone(), &config.capture);
        let heartbeat = HeartbeatPolicy::from_config(&config.capture);
        info!(
            enabled = config.capture.enabled,
            transport = transport.name(),
            heartbeat_threshold_secs = config.capture.heartbeat_threshold_secs,
            "Hook coordinator initialized"
        );
        Self {
            config,
            dispatcher: EventDispatcher::new(builder, transport, clock.clone()),
            heartbeat,
            clock,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Capture runs only when enabled, and never for the relay's own
    /// loop-back requests or the admin area.
    pub fn capturing_enabled(&self, ctx: &RequestContext) -> bool {
        self.config.capture.enabled && !ctx.request().is_local_request && !ctx.request().is_admin
    }

    /// Resolve the request's correlation id. A freshly issued identity
    /// cookie is announced with a `start_of_session` event.
    pub async fn ensure_correlation_id_set(
        &self,
        ctx: &mut RequestContext,
    ) -> Option<CorrelationId> {
        if !self.capturing_enabled(ctx) {
            return None;
        }
        let resolution = identity::resolve(ctx)?;
        if resolution.issued_cookie {
            metrics::counter!("bizevent.identity.cookie_issued").increment(1);
            self.dispatcher
                .send_event(
                    ctx.session(),
                    START_OF_SESSION,
                    &resolution.correlation_id,
                    &HookData::new(),
                )
                .await;
        }
        Some(resolution.correlation_id)
    }

    /// Generic lifecycle hook: resolve identity, heartbeat if due, then
    /// send the organic event.
    pub async fn on_hook(&self, ctx: &mut RequestContext, event_type: &str, hook: &HookData) {
        let Some(correlation_id) = self.ensure_correlation_id_set(ctx).await else {
            return;
        };
        self.heartbeat_if_due(ctx, &correlation_id).await;
        self.dispatcher
            .send_event(ctx.session(), event_type, &correlation_id, hook)
            .await;
    }

    /// Last chance to write cookies. After this call the identity is
    /// frozen; repeated calls only log.
    pub async fn before_response_flush(&self, ctx: &mut RequestContext) {
        if ctx.response_started() {
            debug!("Response already marked as started");
            return;
        }
        if let Some(correlation_id) = self.ensure_correlation_id_set(ctx).await {
            self.heartbeat_if_due(ctx, &correlation_id).await;
        }
        ctx.mark_response_started();
    }

    pub async fn on_customer_login(&self, ctx: &mut RequestContext, hook: &HookData) {
        self.on_hook(ctx, CUSTOMER_LOGIN, hook).await;
        self.restart_heartbeat_clock(ctx);
    }

    pub async fn on_customer_logout(&self, ctx: &mut RequestContext, hook: &HookData) {
        self.on_hook(ctx, CUSTOMER_LOGOUT, hook).await;
        self.restart_heartbeat_clock(ctx);
    }

    fn restart_heartbeat_clock(&self, ctx: &RequestContext) {
        if !self.capturing_enabled(ctx) {
            return;
        }
        // The host rotates its session identity on login and logout.
        if let Some(session) = ctx.session() {
            session.clear_last_event();
        }
    }

    async fn heartbeat_if_due(&self, ctx: &RequestContext, correlation_id: &CorrelationId) {
        if !self
            .heartbeat
            .is_long_since_last_event(ctx.session(), self.clock.now())
        {
            return;
        }
        metrics::counter!("bizevent.heartbeats").increment(1);
        debug!(correlation_id = %correlation_id, "Sending heartbeat");
        self.dispatcher
            .send_event(
                ctx.session(),
                START_OF_SESSION,
                correlation_id,
                &HookData::new(),
            )
            .await;
    }
}
