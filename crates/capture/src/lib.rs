//! Business event capture for a running storefront.
//!
//! The host creates one [`HookCoordinator`] at startup and, for every
//! request, a [`RequestContext`] it passes to the coordinator's hook entry
//! points. Cookies queued on the context must be copied onto the response
//! by the host.

#![warn(clippy::unwrap_used)]

pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod encode;
pub mod heartbeat;
pub mod identity;
pub mod payload;
pub mod sensor;

pub use context::{IdentityState, InboundRequest, RequestContext, SetCookie};
pub use coordinator::{HookCoordinator, CUSTOMER_LOGIN, CUSTOMER_LOGOUT};
pub use dispatcher::EventDispatcher;
pub use encode::{is_personal_field, Encoder, PERSONAL_FIELDS};
pub use heartbeat::HeartbeatPolicy;
pub use identity::{CORRELATION_COOKIE_NAME, CORRELATION_HEADER_NAME};
pub use payload::{EventBuilder, HookData};
pub use sensor::{SensorDescriptor, SensorVariables};
