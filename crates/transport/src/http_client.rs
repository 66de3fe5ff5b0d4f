//! Blocking delivery: POST to the backend and wait for its answer.
//! Meant for diagnostics, where confirming delivery beats latency.

use async_trait::async_trait;
use bizevent_core::config::BackendConfig;
use bizevent_core::{BizEventError, BizEventResult, CorrelationId};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::subprocess::SEQUENCE_HEADER;
use crate::target::RemoteEndpoint;
use crate::{DeliveryOutcome, Transport};

/// POST one serialized event to the backend with Basic auth (API key as
/// user, empty password). Shared by this transport and the relay.
pub async fn post_event(
    client: &Client,
    endpoint: &RemoteEndpoint,
    payload: &str,
    sequence_no: u64,
    correlation_id: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    client
        .post(endpoint.url_for(correlation_id))
        .basic_auth(endpoint.api_key(), Some(""))
        .header(CONTENT_TYPE, "application/json")
        .header(SEQUENCE_HEADER, sequence_no)
        .body(payload.to_owned())
        .send()
        .await
}

pub fn build_client(config: &BackendConfig) -> BizEventResult<Client> {
    Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .build()
        .map_err(|e| BizEventError::Config(format!("failed to build HTTP client: {e}")))
}

pub struct HttpClientTransport {
    client: Client,
    endpoint: RemoteEndpoint,
}

impl HttpClientTransport {
    pub fn new(endpoint: RemoteEndpoint, config: &BackendConfig) -> BizEventResult<Self> {
        Ok(Self {
            client: build_client(config)?,
            endpoint,
        })
    }
}

#[async_trait]
impl Transport for HttpClientTransport {
    fn name(&self) -> &'static str {
        "sync_http"
    }

    async fn send(
        &self,
        payload: &str,
        sequence_no: u64,
        correlation_id: &CorrelationId,
    ) -> DeliveryOutcome {
        let started = Instant::now();
        let result = post_event(
            &self.client,
            &self.endpoint,
            payload,
            sequence_no,
            correlation_id.as_str(),
        )
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) if response.status().is_success() => {
                let status = response.status().as_u16();
                info!(
                    correlation_id = %correlation_id,
                    sequence_no = sequence_no,
                    status = status,
                    latency_ms = latency_ms,
                    "Event delivered to backend"
                );
                DeliveryOutcome::Delivered { status }
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(
                    correlation_id = %correlation_id,
                    sequence_no = sequence_no,
                    status = status.as_u16(),
                    latency_ms = latency_ms,
                    response = %body,
                    "Backend rejected event"
                );
                DeliveryOutcome::failed(format!("backend answered {status}"))
            }
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    sequence_no = sequence_no,
                    latency_ms = latency_ms,
                    error = %e,
                    "Event delivery to backend failed"
                );
                DeliveryOutcome::failed(e.to_string())
            }
        }
    }
}
