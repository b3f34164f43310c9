//! Configuration type definitions.

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub bridge: BridgeOptions,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    /// Guild the bridge operates in.
    pub guild_id: u64,
    /// Channel where operator commands and notices go.
    pub control_channel: u64,
}

/// WhatsApp sidecar configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    /// WebSocket URL of the Baileys sidecar, e.g. "ws://127.0.0.1:3000".
    pub sidecar_url: String,
}

/// Relay behavior toggles and initial state.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeOptions {
    /// Prefix WhatsApp group messages with the sender's name.
    #[serde(default)]
    pub wa_group_prefix: bool,
    /// Prefix messages sent to WhatsApp with the Discord author's name.
    #[serde(default)]
    pub discord_prefix: bool,
    /// Upload Discord attachments to WhatsApp instead of linking them.
    #[serde(default = "default_upload_attachments")]
    pub upload_attachments: bool,
    /// Known bridge-owned category IDs.
    #[serde(default)]
    pub categories: Vec<u64>,
    /// Initial JID whitelist. Empty means all chats are relayed.
    #[serde(default)]
    pub whitelist: Vec<String>,
}

fn default_upload_attachments() -> bool {
    true
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            wa_group_prefix: false,
            discord_prefix: false,
            upload_attachments: true,
            categories: Vec::new(),
            whitelist: Vec::new(),
        }
    }
}
