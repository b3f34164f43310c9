//! Discord side of the bridge: gateway client, event reduction and the
//! operator command surface.

pub mod client;
pub mod commands;
pub mod handler;

pub use client::{ChannelApi, DiscordBot, SerenityChannelApi};
pub use commands::CommandDispatcher;
pub use handler::{EventForwarder, GatewayEvent};
