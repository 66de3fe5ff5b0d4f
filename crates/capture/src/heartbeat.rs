use bizevent_core::config::CaptureConfig;
use bizevent_core::SessionHandle;
use chrono::{DateTime, Duration, Utc};

/// Default idle time after which a keep-alive event is due.
pub const DEFAULT_HEARTBEAT_THRESHOLD_SECS: i64 = 7200;

/// Decides when a synthetic `start_of_session` event must precede the
/// organic one.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatPolicy {
    threshold: Duration,
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_THRESHOLD_SECS)
    }
}

impl HeartbeatPolicy {
    pub fn new(threshold_secs: i64) -> Self {
        Self {
            threshold: Duration::seconds(threshold_secs),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.heartbeat_threshold_secs)
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// False without a session; true if no event was ever attempted or the
    /// last one is strictly older than the threshold.
    pub fn is_long_since_last_event(
        &self,
        session: Option<&SessionHandle>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(session) = session else {
            return false;
        };
        match session.last_event_at() {
            None => true,
            Some(last) => now - last > self.threshold,
        }
    }
}
