//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Validate Discord config
    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }
    if config.discord.guild_id == 0 {
        errors.push("discord.guild_id must be non-zero".to_string());
    }
    if config.discord.control_channel == 0 {
        errors.push("discord.control_channel must be non-zero".to_string());
    }

    // Validate sidecar config
    if config.whatsapp.sidecar_url.is_empty() {
        errors.push("whatsapp.sidecar_url is required".to_string());
    } else if !config.whatsapp.sidecar_url.starts_with("ws://")
        && !config.whatsapp.sidecar_url.starts_with("wss://")
    {
        errors.push(format!(
            "whatsapp.sidecar_url must be a ws:// or wss:// URL (got '{}')",
            config.whatsapp.sidecar_url
        ));
    }

    // Validate whitelist entries
    for (i, jid) in config.bridge.whitelist.iter().enumerate() {
        if !jid.contains('@') {
            errors.push(format!(
                "bridge.whitelist[{}] is not a valid JID: '{}'",
                i, jid
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
