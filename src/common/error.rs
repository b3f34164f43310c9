//! Error types for the application.

use thiserror::Error;

/// Top-level application error.
#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Discord error: {0}")]
    Discord(#[from] DiscordError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Missing required field: {field}")]
    #[allow(dead_code)]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {message}")]
    #[allow(dead_code)]
    InvalidValue { field: String, message: String },
}

/// WhatsApp session errors (sidecar communication).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to connect to sidecar at {url}: {message}")]
    ConnectFailed { url: String, message: String },

    #[error("Sidecar connection closed")]
    ConnectionClosed,

    #[error("Session is not open")]
    NotReady,

    #[error("Sidecar request timed out")]
    Timeout,

    #[error("Invalid sidecar payload: {message}")]
    InvalidPayload { message: String },

    #[error("Send rejected by sidecar: {message}")]
    SendRejected { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-message relay errors.
///
/// These are handled at the message level and never abort a relay stream.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No destination available for {jid}: {message}")]
    DestinationUnavailable { jid: String, message: String },

    #[error("WhatsApp session is not open")]
    SessionNotReady,

    #[error("Attachment of {size} bytes exceeds the media ceiling")]
    MediaTooLarge { size: usize },

    #[error("Quoted message is not known to the bridge")]
    QuoteNotFound,

    #[error("Unsupported message type")]
    UnsupportedMessageType,

    #[error("Send failed: {message}")]
    SendFailed { message: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Discord error: {0}")]
    Discord(#[from] DiscordError),
}

/// Discord-related errors.
#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum DiscordError {
    #[error("Failed to connect to Discord: {message}")]
    ConnectionFailed { message: String },

    #[error("Failed to send message: {message}")]
    SendFailed { message: String },

    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: u64 },

    #[error("Webhook not found for channel {channel_id}")]
    WebhookNotFound { channel_id: u64 },

    #[error("Failed to download attachment '{name}': {message}")]
    AttachmentDownload { name: String, message: String },

    #[error("Serenity error: {0}")]
    Serenity(#[from] serenity::Error),
}

/// Result type alias using AppError.
#[allow(dead_code)]
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Result type alias for relay operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Result type alias for Discord operations.
pub type DiscordResult<T> = std::result::Result<T, DiscordError>;
