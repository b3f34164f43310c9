//! Wire frames exchanged with the Baileys sidecar.
//!
//! Everything on the socket is JSON text. Requests carry a numeric id
//! and the sidecar answers with a `reply` frame bearing the same id;
//! message upserts, reactions, contact syncs and connection updates
//! arrive unsolicited as push frames.

use serde::{Deserialize, Serialize};

use crate::common::messages::{
    Contact, WaContent, WaMediaKind, WaMessageEvent, WaQuote, WaReactionEvent,
};
use crate::wa::session::ReactionKey;

/// Outbound frame: an operation plus its correlation id.
#[derive(Debug, Clone, Serialize)]
pub struct RequestFrame {
    pub id: u64,
    #[serde(flatten)]
    pub op: RequestOp,
}

/// Operations the bridge asks the sidecar to perform.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RequestOp {
    /// First frame after connect. `fresh` discards stored credentials
    /// and forces a new pairing.
    Init { fresh: bool },
    SendText {
        jid: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        quoted_id: Option<String>,
    },
    SendDocument {
        jid: String,
        file_name: String,
        /// Base64-encoded payload.
        data: String,
    },
    SendReaction {
        key: WireReactionKey,
        emoji: String,
    },
    DownloadMedia {
        jid: String,
        message_id: String,
    },
    ProfilePicture {
        jid: String,
    },
    Resync,
}

/// Reaction addressing as the sidecar expects it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireReactionKey {
    pub id: String,
    pub from_me: bool,
    pub remote_jid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

impl From<&ReactionKey> for WireReactionKey {
    fn from(key: &ReactionKey) -> Self {
        Self {
            id: key.id.clone(),
            from_me: key.from_me,
            remote_jid: key.remote_jid.clone(),
            participant: key.participant.clone(),
        }
    }
}

/// Inbound frame from the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SidecarFrame {
    Reply(ReplyFrame),
    Message(WireMessage),
    Reaction(WireReaction),
    Contacts(WireContacts),
    Connection(WireConnectionUpdate),
}

/// Answer to a request, matched by id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyFrame {
    pub id: u64,
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Reply payload of a successful send.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAck {
    pub message_id: String,
}

/// Reply payload of a media download.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    /// Base64-encoded payload.
    pub data: String,
}

/// Reply payload of a profile picture lookup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PicturePayload {
    #[serde(default)]
    pub url: Option<String>,
}

/// A message upsert pushed by the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    pub chat_jid: String,
    #[serde(default)]
    pub participant: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    pub content: WireContent,
    #[serde(default)]
    pub quoted: Option<WireQuote>,
    #[serde(default)]
    pub forwarded: bool,
}

/// Message body variants on the wire. Kinds added by newer sidecar
/// versions fall into `Unsupported` instead of failing the frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WireContent {
    Text { body: String },
    Image(WireMedia),
    Video(WireMedia),
    Audio(WireMedia),
    Document(WireMedia),
    Sticker(WireMedia),
    #[serde(other)]
    Unsupported,
}

/// Media descriptor. The payload itself stays in the sidecar and is
/// fetched with `downloadMedia` only when the message is relayed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMedia {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Quote context attached to a message upsert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireQuote {
    #[serde(default)]
    pub participant: String,
    #[serde(default)]
    pub text: String,
}

/// A reaction pushed by the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireReaction {
    pub chat_jid: String,
    pub target_id: String,
    pub reaction_id: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// A contact/group sync pushed by the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireContacts {
    #[serde(default)]
    pub contacts: Vec<WireContact>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireContact {
    pub jid: String,
    #[serde(default)]
    pub name: String,
}

/// Connection lifecycle update. `qr` and `status` may arrive together.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConnectionUpdate {
    #[serde(default)]
    pub status: Option<WireLinkStatus>,
    #[serde(default)]
    pub qr: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WireLinkStatus {
    Open,
    Close,
}

impl From<WireContent> for WaContent {
    fn from(content: WireContent) -> Self {
        let media = |kind: WaMediaKind, media: WireMedia| WaContent::Media {
            kind,
            file_name: media.file_name,
            caption: media.caption,
            size: media.size,
        };
        match content {
            WireContent::Text { body } => WaContent::Text { body },
            WireContent::Image(m) => media(WaMediaKind::Image, m),
            WireContent::Video(m) => media(WaMediaKind::Video, m),
            WireContent::Audio(m) => media(WaMediaKind::Audio, m),
            WireContent::Document(m) => media(WaMediaKind::Document, m),
            WireContent::Sticker(m) => media(WaMediaKind::Sticker, m),
            WireContent::Unsupported => WaContent::Unsupported,
        }
    }
}

impl From<WireMessage> for WaMessageEvent {
    fn from(message: WireMessage) -> Self {
        Self {
            id: message.id,
            chat_jid: message.chat_jid,
            participant: message.participant,
            from_me: message.from_me,
            push_name: message.push_name,
            timestamp: message.timestamp,
            content: message.content.into(),
            quoted: message.quoted.map(|quote| WaQuote {
                participant: quote.participant,
                text: quote.text,
            }),
            forwarded: message.forwarded,
        }
    }
}

impl From<WireReaction> for WaReactionEvent {
    fn from(reaction: WireReaction) -> Self {
        Self {
            chat_jid: reaction.chat_jid,
            target_id: reaction.target_id,
            reaction_id: reaction.reaction_id,
            emoji: reaction.emoji,
            timestamp: reaction.timestamp,
        }
    }
}

impl From<WireContact> for Contact {
    fn from(contact: WireContact) -> Self {
        Self {
            jid: contact.jid,
            name: contact.name,
        }
    }
}
