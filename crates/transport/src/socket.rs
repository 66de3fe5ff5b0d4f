//! Fire-and-forget delivery to the local relay over a raw TCP socket.
//!
//! Connecting to a remote host can block for a full round trip, so the
//! socket only ever targets the relay on this host, where connecting is
//! near-instant. The request is written without ever reading a response
//! and the socket is closed straight away; the relay does the slow remote
//! delivery on its own time.

use async_trait::async_trait;
use bizevent_core::config::RelayConfig;
use bizevent_core::{BizEventError, BizEventResult, CorrelationId};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::request::RelayRequest;
use crate::target::TransportConfig;
use crate::{DeliveryOutcome, Transport};

pub struct AsyncSocketTransport {
    target: Arc<TransportConfig>,
    connect_timeout: Duration,
    max_zero_writes: u32,
}

impl AsyncSocketTransport {
    pub fn new(target: Arc<TransportConfig>, config: &RelayConfig) -> BizEventResult<Self> {
        if target.scheme != "http" {
            return Err(BizEventError::Config(format!(
                "async socket transport needs a plain http relay url, got '{}'",
                target.url()
            )));
        }
        if config.max_zero_writes == 0 {
            return Err(BizEventError::Config(
                "relay.max_zero_writes must be at least 1".into(),
            ));
        }
        Ok(Self {
            target,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            max_zero_writes: config.max_zero_writes,
        })
    }

    async fn connect(&self) -> Result<TcpStream, String> {
        let addr = (self.target.host.as_str(), self.target.port);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(format!("connect to {} failed: {e}", self.target.host_header())),
            Err(_) => Err(format!(
                "connect to {} timed out after {}ms",
                self.target.host_header(),
                self.connect_timeout.as_millis()
            )),
        }
    }
}

#[async_trait]
impl Transport for AsyncSocketTransport {
    fn name(&self) -> &'static str {
        "async_socket"
    }

    async fn send(
        &self,
        payload: &str,
        sequence_no: u64,
        correlation_id: &CorrelationId,
    ) -> DeliveryOutcome {
        let frame = RelayRequest {
            data: payload,
            sequence_no,
            correlation_id: correlation_id.as_str(),
            send_key: &self.target.send_key,
        }
        .http_frame(&self.target);

        let mut stream = match self.connect().await {
            Ok(stream) => stream,
            Err(reason) => {
                warn!(
                    correlation_id = %correlation_id,
                    sequence_no = sequence_no,
                    error = %reason,
                    "Relay connection failed"
                );
                return DeliveryOutcome::Failed { reason };
            }
        };

        let outcome = write_best_effort(
            &stream,
            frame.as_bytes(),
            self.max_zero_writes,
            self.connect_timeout,
        )
        .await;

        // Half-close so the relay sees the end of the request; no response
        // is ever read.
        let _ = stream.shutdown().await;

        debug!(
            correlation_id = %correlation_id,
            sequence_no = sequence_no,
            outcome = outcome.label(),
            "Relay request written"
        );
        outcome
    }
}

/// Write `buf` with non-blocking writes. An attempt that moves no bytes
/// counts against `max_zero_writes` and then waits at most `readiness_wait`
/// for the socket to drain; once the count is used up the remainder is
/// dropped. Progress never resets the count.
pub async fn write_best_effort(
    stream: &TcpStream,
    buf: &[u8],
    max_zero_writes: u32,
    readiness_wait: Duration,
) -> DeliveryOutcome {
    let mut written = 0;
    let mut zero_writes = 0;

    while written < buf.len() {
        match stream.try_write(&buf[written..]) {
            Ok(0) => {}
            Ok(n) => {
                written += n;
                continue;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return DeliveryOutcome::failed(format!(
                    "write failed after {written} of {} bytes: {e}",
                    buf.len()
                ));
            }
        }

        zero_writes += 1;
        if zero_writes >= max_zero_writes {
            warn!(
                written = written,
                total = buf.len(),
                zero_writes = zero_writes,
                "Relay stopped accepting bytes, abandoning request"
            );
            return DeliveryOutcome::Abandoned {
                written,
                total: buf.len(),
            };
        }
        let _ = tokio::time::timeout(readiness_wait, stream.writable()).await;
    }

    DeliveryOutcome::Written { bytes: written }
}
