//! Delivery through a detached HTTP client process (curl by default).
//!
//! The process posts straight to the backend. It is started with all output
//! discarded and is never waited on; the payload is streamed to its stdin
//! from a background task so the caller returns as soon as it is spawned.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bizevent_core::config::SubprocessConfig;
use bizevent_core::CorrelationId;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::target::RemoteEndpoint;
use crate::{DeliveryOutcome, Transport};

/// Header carrying the sequence number on direct deliveries.
pub const SEQUENCE_HEADER: &str = "X-BizEvent-Sequence";

pub struct SubprocessTransport {
    program: String,
    connect_timeout_secs: u64,
    endpoint: RemoteEndpoint,
}

impl SubprocessTransport {
    pub fn new(endpoint: RemoteEndpoint, config: &SubprocessConfig) -> Self {
        Self {
            program: config.program.clone(),
            connect_timeout_secs: config.connect_timeout_secs,
            endpoint,
        }
    }

    /// Arguments handed to the client program. The body is read from stdin.
    pub fn command_args(&self, sequence_no: u64, correlation_id: &CorrelationId) -> Vec<String> {
        let credentials = BASE64.encode(format!("{}:", self.endpoint.api_key()));
        vec![
            "--silent".into(),
            "--show-error".into(),
            "--output".into(),
            "-".into(),
            "--connect-timeout".into(),
            self.connect_timeout_secs.to_string(),
            "--request".into(),
            "POST".into(),
            "--header".into(),
            "Content-Type: application/json".into(),
            "--header".into(),
            format!("Authorization: Basic {credentials}"),
            "--header".into(),
            format!("{SEQUENCE_HEADER}: {sequence_no}"),
            "--data-binary".into(),
            "@-".into(),
            self.endpoint.url_for(correlation_id.as_str()),
        ]
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn send(
        &self,
        payload: &str,
        sequence_no: u64,
        correlation_id: &CorrelationId,
    ) -> DeliveryOutcome {
        let spawned = Command::new(&self.program)
            .args(self.command_args(sequence_no, correlation_id))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    program = %self.program,
                    correlation_id = %correlation_id,
                    sequence_no = sequence_no,
                    error = %e,
                    "Failed to launch event client process"
                );
                return DeliveryOutcome::failed(format!("spawn '{}' failed: {e}", self.program));
            }
        };

        let pid = child.id();
        if let Some(mut stdin) = child.stdin.take() {
            let body = payload.to_owned();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(body.as_bytes()).await {
                    debug!(error = %e, "Event client process closed stdin early");
                }
            });
        }
        // Dropping the handle leaves the process running; the runtime reaps it.
        drop(child);

        debug!(
            pid = ?pid,
            correlation_id = %correlation_id,
            sequence_no = sequence_no,
            "Event client process launched"
        );
        DeliveryOutcome::Launched { pid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizevent_core::config::AppConfig;
    use bizevent_core::CorrelationOrigin;

    fn endpoint() -> RemoteEndpoint {
        let mut config = AppConfig::default();
        config.capture.api_key = "api-key".into();
        RemoteEndpoint::from_config(&config).unwrap()
    }

    fn transport(program: &str) -> SubprocessTransport {
        SubprocessTransport::new(
            endpoint(),
            &SubprocessConfig {
                program: program.into(),
                connect_timeout_secs: 2,
            },
        )
    }

    #[test]
    fn test_command_args_target_backend() {
        let id = CorrelationId::new("999", CorrelationOrigin::Cookie);
        let args = transport("curl").command_args(5, &id);

        assert_eq!(
            args.last().unwrap(),
            "https://app.cartdefender.com/plugin/999/v1-beta/magentoBizEvent"
        );
        assert!(args.contains(&"X-BizEvent-Sequence: 5".to_string()));
        // base64("api-key:")
        assert!(args.contains(&"Authorization: Basic YXBpLWtleTo=".to_string()));
        assert!(args.contains(&"@-".to_string()));
    }

    #[tokio::test]
    async fn test_launch_returns_without_waiting() {
        let id = CorrelationId::generate();
        let outcome = transport("true").send("{}", 0, &id).await;
        assert!(matches!(outcome, DeliveryOutcome::Launched { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let id = CorrelationId::generate();
        let outcome = transport("/nonexistent/bizevent-client").send("{}", 0, &id).await;
        assert!(outcome.is_failure());
    }
}
