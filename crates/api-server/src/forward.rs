//! Synchronous hop from the local relay to the analytics backend.

use bizevent_core::config::AppConfig;
use bizevent_core::{BizEventError, BizEventResult};
use bizevent_transport::http_client::{build_client, post_event};
use bizevent_transport::RemoteEndpoint;
use reqwest::Client;
use std::time::Instant;
use tracing::{info, warn};

pub struct RemoteForwarder {
    client: Client,
    endpoint: RemoteEndpoint,
}

impl RemoteForwarder {
    pub fn from_config(config: &AppConfig) -> BizEventResult<Self> {
        Ok(Self {
            client: build_client(&config.backend)?,
            endpoint: RemoteEndpoint::from_config(config)?,
        })
    }

    /// POST one event and wait for the backend. The outcome is logged here;
    /// callers only decide whether to look at the error.
    pub async fn forward(
        &self,
        data: &str,
        sequence_no: u64,
        correlation_id: &str,
    ) -> BizEventResult<()> {
        let url = self.endpoint.url_for(correlation_id);
        let started = Instant::now();
        let result = post_event(&self.client, &self.endpoint, data, sequence_no, correlation_id).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("bizevent.relay.forward_latency_ms").record(latency_ms as f64);

        match result {
            Ok(response) if response.status().is_success() => {
                info!(
                    sequence_no = sequence_no,
                    correlation_id = %correlation_id,
                    url = %url,
                    status = response.status().as_u16(),
                    latency_ms = latency_ms,
                    "Event forwarded"
                );
                Ok(())
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                metrics::counter!("bizevent.relay.forward_errors").increment(1);
                warn!(
                    sequence_no = sequence_no,
                    correlation_id = %correlation_id,
                    url = %url,
                    status = status,
                    response = %body,
                    latency_ms = latency_ms,
                    "Backend rejected forwarded event"
                );
                Err(BizEventError::Relay(format!("backend answered {status}")))
            }
            Err(e) => {
                metrics::counter!("bizevent.relay.forward_errors").increment(1);
                warn!(
                    sequence_no = sequence_no,
                    correlation_id = %correlation_id,
                    url = %url,
                    error = %e,
                    latency_ms = latency_ms,
                    "Event forwarding failed"
                );
                Err(BizEventError::Transport(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;

    fn config_for(backend: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.capture.api_key = "api".into();
        config.capture.test_mode = true;
        config.capture.test_server_url_start = backend.into();
        config.backend.request_timeout_ms = 500;
        config
    }

    #[test]
    fn test_forwarder_needs_api_key() {
        assert!(RemoteForwarder::from_config(&AppConfig::default()).is_err());

        let mut config = AppConfig::default();
        config.capture.api_key = "api".into();
        assert!(RemoteForwarder::from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let forwarder = RemoteForwarder::from_config(&config_for("http://127.0.0.1:9")).unwrap();
        let result = forwarder.forward("{}", 0, "1").await;
        assert!(matches!(result, Err(BizEventError::Transport(_))));
    }

    #[tokio::test]
    async fn test_backend_refusal_is_relay_error() {
        let app = Router::new().route(
            "/plugin/:correlation_id/v1-beta/magentoBizEvent",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let forwarder = RemoteForwarder::from_config(&config_for(&format!("http://{addr}"))).unwrap();
        match forwarder.forward("{}", 4, "1").await {
            Err(BizEventError::Relay(message)) => assert!(message.contains("500")),
            other => panic!("expected relay error, got {other:?}"),
        }
    }
}
