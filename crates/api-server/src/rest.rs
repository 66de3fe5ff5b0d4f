//! REST handlers for the local relay and operational endpoints.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use bizevent_core::types::is_valid_token;
use bizevent_transport::RelayForm;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::forward::RemoteForwarder;

/// Body of every relay response, whatever happened to the event.
pub const RELAY_RESPONSE: &str = "Done";

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<RemoteForwarder>,
    pub send_key: Arc<str>,
    pub capture_enabled: bool,
    pub node_id: String,
    pub start_time: Instant,
}

/// Why the relay refused to forward a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotLocal,
    SendKeyMismatch,
    EmptyData,
    InvalidCorrelationId,
    CaptureDisabled,
    UnreadableBody,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::NotLocal => "not_local",
            Rejection::SendKeyMismatch => "send_key_mismatch",
            Rejection::EmptyData => "empty_data",
            Rejection::InvalidCorrelationId => "invalid_correlation_id",
            Rejection::CaptureDisabled => "capture_disabled",
            Rejection::UnreadableBody => "unreadable_body",
        }
    }
}

/// Accept only our own loop-back requests carrying an event.
pub fn verify(form: &RelayForm, send_key: &str, capture_enabled: bool) -> Result<(), Rejection> {
    if !form.is_local_request {
        return Err(Rejection::NotLocal);
    }
    if form.send_key.as_deref() != Some(send_key) {
        return Err(Rejection::SendKeyMismatch);
    }
    if form.data.as_deref().map_or(true, str::is_empty) {
        return Err(Rejection::EmptyData);
    }
    // The id becomes a path segment of the backend URL.
    if !form.correlation_id.as_deref().map_or(false, is_valid_token) {
        return Err(Rejection::InvalidCorrelationId);
    }
    if !capture_enabled {
        return Err(Rejection::CaptureDisabled);
    }
    Ok(())
}

fn reject(rejection: Rejection, sequence_no: u64) -> &'static str {
    warn!(
        reason = rejection.as_str(),
        sequence_no = sequence_no,
        "Relay request rejected"
    );
    metrics::counter!("bizevent.relay.rejected", "reason" => rejection.as_str()).increment(1);
    RELAY_RESPONSE
}

/// POST relay endpoint. Always answers 200 "Done", including for bodies the
/// extractor could not read.
pub async fn handle_send(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> &'static str {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            debug!(error = %e, "Relay body could not be read");
            return reject(Rejection::UnreadableBody, 0);
        }
    };
    let form = RelayForm::parse(&body);
    let sequence_no = form.sequence_no.unwrap_or_default();

    if let Err(rejection) = verify(&form, &state.send_key, state.capture_enabled) {
        return reject(rejection, sequence_no);
    }
    metrics::counter!("bizevent.relay.accepted").increment(1);

    let data = form.data.unwrap_or_default();
    let correlation_id = form.correlation_id.unwrap_or_default();

    // Forwarding must outlive a caller that hangs up after writing.
    let forwarder = state.forwarder.clone();
    let task = tokio::spawn(async move {
        forwarder
            .forward(&data, sequence_no, &correlation_id)
            .await
    });
    match task.await {
        Ok(Ok(())) => debug!(sequence_no = sequence_no, "Relay work done"),
        Ok(Err(e)) => debug!(
            sequence_no = sequence_no,
            error = %e,
            "Relay work done, event not delivered"
        ),
        Err(e) => error!(sequence_no = sequence_no, error = %e, "Relay forwarding task failed"),
    }

    RELAY_RESPONSE
}

/// GET /health: health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        capture_enabled: state.capture_enabled,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /live: liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub capture_enabled: bool,
    pub uptime_secs: u64,
}
