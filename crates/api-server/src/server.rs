//! Relay server: the local relay endpoint plus health probes, and the
//! Prometheus exporter on its own port.

use crate::forward::RemoteForwarder;
use crate::rest::{self, AppState};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use bizevent_core::config::AppConfig;
use bizevent_transport::TransportConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct RelayServer {
    config: AppConfig,
    state: AppState,
    relay_path: String,
}

impl RelayServer {
    pub fn new(config: AppConfig, forwarder: Arc<RemoteForwarder>, target: &TransportConfig) -> Self {
        let relay_path = target
            .path
            .split('?')
            .next()
            .filter(|p| !p.is_empty())
            .unwrap_or("/")
            .to_string();
        let state = AppState {
            forwarder,
            send_key: Arc::from(target.send_key.as_str()),
            capture_enabled: config.capture.enabled,
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        };
        Self {
            config,
            state,
            relay_path,
        }
    }

    pub fn relay_path(&self) -> &str {
        &self.relay_path
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.relay_path, post(rest::handle_send))
            .route("/health", get(rest::health_check))
            .route("/live", get(rest::liveness))
            .layer(DefaultBodyLimit::max(self.config.api.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the HTTP relay server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, path = %self.relay_path, "Starting relay server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }

    /// Start the metrics exporter on a separate port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
