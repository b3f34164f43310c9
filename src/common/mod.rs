//! Common utilities and types shared across the application.

pub mod error;
pub mod messages;

// Re-export the types most modules need
pub use messages::{
    CommandEvent, DiscordMessageEvent, DiscordReactionEvent, Jid, WaMessageEvent, WaReactionEvent,
};
