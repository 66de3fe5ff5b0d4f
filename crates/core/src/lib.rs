#![warn(clippy::unwrap_used)]

pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod session;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, TransportKind};
pub use error::{BizEventError, BizEventResult};
pub use session::{InMemorySessionStore, SessionHandle, SessionState, SessionStore};
pub use types::{Captured, CorrelationId, CorrelationOrigin, EventEnvelope};

/// Placeholder the backend receives for anything that could not be captured.
pub const MISSING_VALUE: &str = "(?MV?)";

/// Event type of the synthetic keep-alive event.
pub const START_OF_SESSION: &str = "start_of_session";
