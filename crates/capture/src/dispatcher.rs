//! Sequencing, building and sending of one event.

use bizevent_core::{Clock, CorrelationId, SessionHandle};
use bizevent_transport::{DeliveryOutcome, Transport};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::payload::{EventBuilder, HookData};

pub struct EventDispatcher {
    builder: EventBuilder,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl EventDispatcher {
    pub fn new(builder: EventBuilder, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            builder,
            transport,
            clock,
        }
    }

    pub fn builder(&self) -> &EventBuilder {
        &self.builder
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Take the session's next sequence number, build the event and hand it
    /// to the transport. The attempt is stamped on the session whatever the
    /// outcome. Without a session the event carries sequence 0 and nothing
    /// is persisted.
    pub async fn send_event(
        &self,
        session: Option<&SessionHandle>,
        event_type: &str,
        correlation_id: &CorrelationId,
        hook: &HookData,
    ) -> DeliveryOutcome {
        let sequence_no = session.map_or(0, SessionHandle::next_sequence_no);

        let payload = match self.builder.build_event(
            event_type,
            hook,
            sequence_no,
            correlation_id,
            session,
        ) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    event_type = event_type,
                    correlation_id = %correlation_id,
                    sequence_no = sequence_no,
                    error = %e,
                    "Failed to serialize event"
                );
                return DeliveryOutcome::failed(e.to_string());
            }
        };

        let started = Instant::now();
        let outcome = self
            .transport
            .send(&payload, sequence_no, correlation_id)
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        if let Some(session) = session {
            session.stamp_last_event(self.clock.now());
        }

        metrics::counter!(
            "bizevent.events.dispatched",
            "transport" => self.transport.name(),
            "outcome" => outcome.label()
        )
        .increment(1);

        if outcome.is_failure() {
            warn!(
                event_type = event_type,
                correlation_id = %correlation_id,
                sequence_no = sequence_no,
                transport = self.transport.name(),
                outcome = ?outcome,
                latency_ms = latency_ms,
                "Event send failed"
            );
        } else {
            debug!(
                event_type = event_type,
                correlation_id = %correlation_id,
                sequence_no = sequence_no,
                transport = self.transport.name(),
                outcome = outcome.label(),
                latency_ms = latency_ms,
                "Event sent"
            );
        }
        outcome
    }
}
