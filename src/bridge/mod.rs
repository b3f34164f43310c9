//! Bridge core: shared state, identity mapping, message translation and
//! the relay orchestrator that ties the two chat networks together.

pub mod correlation;
pub mod mapper;
pub mod orchestrator;
pub mod state;
pub mod translator;

pub use mapper::IdentityMapper;
pub use orchestrator::RelayOrchestrator;
pub use state::{BridgeState, Settings};
