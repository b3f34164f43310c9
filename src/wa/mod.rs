//! WhatsApp side of the bridge: sidecar transport, session surface and
//! connection resiliency.

pub mod resiliency;
pub mod session;
pub mod transport;
pub mod types;

pub use resiliency::{SessionHandle, SessionSupervisor, WaRelayEvent};
pub use session::{ReactionKey, WaSession};
