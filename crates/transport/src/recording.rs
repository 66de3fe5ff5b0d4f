//! In-memory transport that captures sends, for tests and dry runs.

use async_trait::async_trait;
use bizevent_core::CorrelationId;
use parking_lot::Mutex;

use crate::{DeliveryOutcome, Transport};

/// One captured send.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSend {
    pub payload: String,
    pub sequence_no: u64,
    pub correlation_id: String,
}

impl RecordedSend {
    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.payload).unwrap_or(serde_json::Value::Null)
    }

    pub fn event_type(&self) -> Option<String> {
        self.payload_json()
            .get("eventType")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    sends: Mutex<Vec<RecordedSend>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sends.lock().len()
    }

    pub fn clear(&self) {
        self.sends.lock().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(
        &self,
        payload: &str,
        sequence_no: u64,
        correlation_id: &CorrelationId,
    ) -> DeliveryOutcome {
        self.sends.lock().push(RecordedSend {
            payload: payload.to_owned(),
            sequence_no,
            correlation_id: correlation_id.as_str().to_owned(),
        });
        DeliveryOutcome::Written {
            bytes: payload.len(),
        }
    }
}
