//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `FERRYMAN_DISCORD_TOKEN` - Discord bot token
//! - `FERRYMAN_GUILD_ID` - Discord guild ID
//! - `FERRYMAN_CONTROL_CHANNEL` - Control channel ID
//! - `FERRYMAN_SIDECAR_URL` - WhatsApp sidecar WebSocket URL

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "FERRYMAN";

/// Apply environment variable overrides to a config.
///
/// This allows sensitive values like tokens to be provided via
/// environment variables instead of the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    // Discord token
    if let Ok(token) = env::var(format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }

    // Discord guild and control channel
    if let Ok(guild_id) = env::var(format!("{}_GUILD_ID", ENV_PREFIX)) {
        if let Ok(id) = guild_id.parse() {
            config.discord.guild_id = id;
        }
    }
    if let Ok(channel) = env::var(format!("{}_CONTROL_CHANNEL", ENV_PREFIX)) {
        if let Ok(id) = channel.parse() {
            config.discord.control_channel = id;
        }
    }

    // Sidecar endpoint
    if let Ok(url) = env::var(format!("{}_SIDECAR_URL", ENV_PREFIX)) {
        config.whatsapp.sidecar_url = url;
    }

    config
}

/// Check if any required environment variables are set but empty.
///
/// Returns a list of variable names that are set but empty.
pub fn check_empty_env_vars() -> Vec<String> {
    let vars = [
        format!("{}_DISCORD_TOKEN", ENV_PREFIX),
        format!("{}_SIDECAR_URL", ENV_PREFIX),
    ];

    vars.into_iter()
        .filter(|var| env::var(var).map(|v| v.is_empty()).unwrap_or(false))
        .collect()
}

/// Get the config file path from environment or use default.
///
/// Checks `FERRYMAN_CONFIG` environment variable, otherwise returns "ferryman.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "ferryman.conf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn make_test_config() -> Config {
        Config {
            discord: DiscordConfig {
                token: "original_token".to_string(),
                guild_id: 1,
                control_channel: 2,
            },
            whatsapp: WhatsAppConfig {
                sidecar_url: "ws://127.0.0.1:3000".to_string(),
            },
            bridge: BridgeOptions::default(),
        }
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ENV_PREFIX, "FERRYMAN");
    }

    #[test]
    fn test_get_config_path_default() {
        // Clear the env var first
        env::remove_var("FERRYMAN_CONFIG");
        assert_eq!(get_config_path(), "ferryman.conf");
    }

    #[test]
    fn test_apply_env_overrides_no_vars() {
        // Clear all relevant env vars
        env::remove_var("FERRYMAN_DISCORD_TOKEN");
        env::remove_var("FERRYMAN_SIDECAR_URL");

        let config = make_test_config();
        let result = apply_env_overrides(config);

        // Should remain unchanged
        assert_eq!(result.discord.token, "original_token");
        assert_eq!(result.whatsapp.sidecar_url, "ws://127.0.0.1:3000");
    }
}
