//! Operations the bridge performs against a live WhatsApp session.

use serenity::async_trait;

use crate::common::error::SessionResult;
use crate::common::messages::{is_group_jid, Jid};

/// Addressing key for a reaction sent to WhatsApp.
///
/// WhatsApp reactions target a message by chat, id and authorship. In
/// group chats the original sender must be named as `participant`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionKey {
    /// WhatsApp id of the message being reacted to.
    pub id: String,
    /// Whether the bridge account authored the target message.
    pub from_me: bool,
    /// Chat the target message belongs to.
    pub remote_jid: Jid,
    /// Sender of the target message within a group chat.
    pub participant: Option<Jid>,
}

impl ReactionKey {
    /// Key for a direct chat, or a group chat when the sender is known.
    pub fn new(id: String, from_me: bool, remote_jid: Jid, sender: Option<Jid>) -> Self {
        let participant = if is_group_jid(&remote_jid) { sender } else { None };
        Self {
            id,
            from_me,
            remote_jid,
            participant,
        }
    }
}

/// A live WhatsApp session, reached through the sidecar.
///
/// All sends return the WhatsApp id of the message they produced so the
/// caller can record a correlation entry.
#[async_trait]
pub trait WaSession: Send + Sync {
    /// Send a text message, optionally quoting an earlier message by id.
    async fn send_text(
        &self,
        jid: &str,
        text: &str,
        quoted_id: Option<&str>,
    ) -> SessionResult<String>;

    /// Send a file as a document attachment.
    async fn send_document(
        &self,
        jid: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> SessionResult<String>;

    /// Send a reaction. An empty emoji removes an earlier reaction.
    async fn send_reaction(&self, key: &ReactionKey, emoji: &str) -> SessionResult<String>;

    /// Download the media payload of a message the sidecar still holds.
    async fn download_media(&self, chat_jid: &str, message_id: &str) -> SessionResult<Vec<u8>>;

    /// Profile picture URL of a chat or contact, if one is set.
    async fn profile_picture(&self, jid: &str) -> SessionResult<Option<String>>;

    /// Ask the sidecar to replay contact and group metadata.
    async fn resync(&self) -> SessionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaction_key_keeps_participant_for_groups() {
        let key = ReactionKey::new(
            "MSG".to_string(),
            false,
            "123-456@g.us".to_string(),
            Some("user@s.whatsapp.net".to_string()),
        );
        assert_eq!(key.participant.as_deref(), Some("user@s.whatsapp.net"));
    }

    #[test]
    fn test_reaction_key_drops_participant_for_direct_chats() {
        let key = ReactionKey::new(
            "MSG".to_string(),
            true,
            "123@s.whatsapp.net".to_string(),
            Some("user@s.whatsapp.net".to_string()),
        );
        assert!(key.participant.is_none());
    }
}
