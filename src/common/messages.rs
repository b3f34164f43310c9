//! Canonical message types for bridge communication.
//!
//! This module defines the single source of truth for the event and
//! content types flowing between the WhatsApp session and Discord.

use serenity::model::id::{ChannelId, MessageId};

/// WhatsApp chat/user identifier, e.g. `1234567890@s.whatsapp.net`.
pub type Jid = String;

/// Suffix shared by all group JIDs.
pub const GROUP_JID_SUFFIX: &str = "@g.us";

/// Suffix shared by all direct-chat user JIDs.
pub const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

/// Returns true if the JID addresses a group chat.
pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with(GROUP_JID_SUFFIX)
}

/// User part of a JID (`1234@s.whatsapp.net` -> `1234`).
pub fn jid_user_part(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}

/// Kind of media carried by a WhatsApp message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaMediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl WaMediaKind {
    /// Fallback file name used when the message carries none.
    pub fn default_file_name(&self) -> &'static str {
        match self {
            WaMediaKind::Image => "image.jpg",
            WaMediaKind::Video => "video.mp4",
            WaMediaKind::Audio => "audio.ogg",
            WaMediaKind::Document => "document",
            WaMediaKind::Sticker => "sticker.webp",
        }
    }
}

/// Body content of a WhatsApp message event.
#[derive(Debug, Clone)]
pub enum WaContent {
    /// Plain or extended text.
    Text { body: String },
    /// Media with an optional caption. The payload stays in the sidecar
    /// and is fetched by id only when the message is actually relayed.
    Media {
        kind: WaMediaKind,
        file_name: Option<String>,
        caption: Option<String>,
        size: u64,
    },
    /// Anything the bridge does not relay.
    Unsupported,
}

/// Quote context attached to a WhatsApp message.
#[derive(Debug, Clone)]
pub struct WaQuote {
    /// JID of the quoted sender. May be empty when unknown.
    pub participant: Jid,
    /// Quoted text.
    pub text: String,
}

/// A message received from the WhatsApp session.
#[derive(Debug, Clone)]
pub struct WaMessageEvent {
    /// WhatsApp message id (`key.id`).
    pub id: String,
    /// Chat the message belongs to (`key.remoteJid`).
    pub chat_jid: Jid,
    /// Sender within a group chat; absent for direct chats.
    pub participant: Option<Jid>,
    /// Whether the account owner sent this message.
    pub from_me: bool,
    /// Sender's push name, if the event carried one.
    pub push_name: Option<String>,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    pub content: WaContent,
    pub quoted: Option<WaQuote>,
    pub forwarded: bool,
}

impl WaMessageEvent {
    /// JID of the actual sender: the group participant when present,
    /// otherwise the chat itself.
    pub fn sender_jid(&self) -> &str {
        self.participant.as_deref().unwrap_or(&self.chat_jid)
    }
}

/// A reaction received from the WhatsApp session.
#[derive(Debug, Clone)]
pub struct WaReactionEvent {
    /// Chat the reaction belongs to.
    pub chat_jid: Jid,
    /// Id of the message being reacted to (`key.id`).
    pub target_id: String,
    /// Id of the reaction message itself (`reaction.key.id`).
    pub reaction_id: String,
    /// Reaction emoji. Empty means the reaction was removed.
    pub emoji: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

/// A WhatsApp contact or group entry from a sidecar sync.
#[derive(Debug, Clone)]
pub struct Contact {
    pub jid: Jid,
    pub name: String,
}

/// A file payload attached to an outbound send.
#[derive(Debug, Clone)]
pub struct OutFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// An attachment on a Discord message.
#[derive(Debug, Clone)]
pub struct DiscordAttachment {
    pub url: String,
    pub file_name: String,
    pub size: u64,
}

/// A message received from Discord, already reduced to what the relay
/// pipeline needs.
#[derive(Debug, Clone)]
pub struct DiscordMessageEvent {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// Category the channel sits under, if any.
    pub parent_category: Option<ChannelId>,
    /// Nickname if set, otherwise the username.
    pub author_name: String,
    /// Whether a webhook authored this message.
    pub webhook_authored: bool,
    pub content: String,
    pub attachments: Vec<DiscordAttachment>,
    /// Raw embed objects, serialized per embed when relayed.
    pub embeds: Vec<serde_json::Value>,
    /// Discord message id this message replies to.
    pub reply_to: Option<MessageId>,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

/// A reaction added or removed on a Discord message.
#[derive(Debug, Clone)]
pub struct DiscordReactionEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub emoji: String,
    pub removed: bool,
    /// Whether the reacted-to message was webhook-authored.
    pub target_webhook_authored: bool,
    /// Author name of the reacted-to message.
    pub target_author_name: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

/// An operator command typed in the control channel.
#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub content: String,
    /// Creation time in milliseconds, used by `ping`.
    pub created_ms: i64,
}
