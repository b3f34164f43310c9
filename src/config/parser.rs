//! Configuration file parsing (HOCON format).

use std::path::Path;

use crate::common::error::ConfigError;
use crate::config::types::Config;
use hocon::HoconLoader;

/// Load configuration from a HOCON file (typically `ferryman.conf`).
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    HoconLoader::new()
        .load_file(path)
        .map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// Load configuration from a HOCON string.
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    HoconLoader::new()
        .load_str(content)
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = load_config_str(
            r#"
            discord {
                token = "abc"
                guild_id = 123
                control_channel = 456
            }
            whatsapp {
                sidecar_url = "ws://127.0.0.1:3000"
            }
            "#,
        )
        .expect("minimal config should parse");

        assert_eq!(config.discord.token, "abc");
        assert_eq!(config.discord.guild_id, 123);
        assert_eq!(config.discord.control_channel, 456);
        assert!(config.bridge.upload_attachments);
        assert!(config.bridge.whitelist.is_empty());
    }

    #[test]
    fn test_parse_bridge_options() {
        let config = load_config_str(
            r#"
            discord {
                token = "abc"
                guild_id = 123
                control_channel = 456
            }
            whatsapp {
                sidecar_url = "ws://127.0.0.1:3000"
            }
            bridge {
                wa_group_prefix = true
                upload_attachments = false
                whitelist = ["123@s.whatsapp.net"]
            }
            "#,
        )
        .expect("config with bridge options should parse");

        assert!(config.bridge.wa_group_prefix);
        assert!(!config.bridge.discord_prefix);
        assert!(!config.bridge.upload_attachments);
        assert_eq!(config.bridge.whitelist.len(), 1);
    }
}
