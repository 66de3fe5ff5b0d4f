//! Delivery of serialized business events off the request path.
//!
//! Three interchangeable strategies implement [`Transport`]:
//!
//! - [`AsyncSocketTransport`]: hand-framed POST to the local relay over a
//!   raw TCP socket; never reads the response
//! - [`SubprocessTransport`]: detached HTTP client process posting straight
//!   to the backend
//! - [`HttpClientTransport`]: blocking POST to the backend; diagnostics only
//!
//! The strategy is picked once at startup with [`from_config`].

#![warn(clippy::unwrap_used)]

pub mod http_client;
pub mod recording;
pub mod request;
pub mod socket;
pub mod subprocess;
pub mod target;

use async_trait::async_trait;
use bizevent_core::config::AppConfig;
use bizevent_core::{BizEventResult, CorrelationId, TransportKind};
use std::sync::Arc;
use tracing::info;

pub use http_client::HttpClientTransport;
pub use recording::RecordingTransport;
pub use request::{RelayForm, RelayRequest};
pub use socket::AsyncSocketTransport;
pub use subprocess::SubprocessTransport;
pub use target::{resolve_send_key, RemoteEndpoint, TransportConfig};

/// What became of one send attempt. Callers only log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The whole request was handed to the socket.
    Written { bytes: usize },
    /// The peer stopped taking bytes; the remainder was dropped.
    Abandoned { written: usize, total: usize },
    /// The client process was started and left running.
    Launched { pid: Option<u32> },
    /// The backend answered with a success status.
    Delivered { status: u16 },
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        DeliveryOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DeliveryOutcome::Failed { .. } | DeliveryOutcome::Abandoned { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Written { .. } => "written",
            DeliveryOutcome::Abandoned { .. } => "abandoned",
            DeliveryOutcome::Launched { .. } => "launched",
            DeliveryOutcome::Delivered { .. } => "delivered",
            DeliveryOutcome::Failed { .. } => "failed",
        }
    }
}

/// One-method delivery contract shared by all strategies.
///
/// Implementations must return as soon as their strategy allows and must
/// never surface errors to the caller: failures come back as
/// [`DeliveryOutcome::Failed`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Strategy identifier (e.g. "async_socket").
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        payload: &str,
        sequence_no: u64,
        correlation_id: &CorrelationId,
    ) -> DeliveryOutcome;
}

/// Build the configured strategy. `relay` is the process-wide relay target,
/// resolved once at startup.
pub fn from_config(
    config: &AppConfig,
    relay: Arc<TransportConfig>,
) -> BizEventResult<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match config.capture.transport {
        TransportKind::AsyncSocket => Arc::new(AsyncSocketTransport::new(relay, &config.relay)?),
        TransportKind::Subprocess => Arc::new(SubprocessTransport::new(
            RemoteEndpoint::from_config(config)?,
            &config.subprocess,
        )),
        TransportKind::SyncHttp => Arc::new(HttpClientTransport::new(
            RemoteEndpoint::from_config(config)?,
            &config.backend,
        )?),
    };
    info!(transport = transport.name(), "Event transport selected");
    Ok(transport)
}
