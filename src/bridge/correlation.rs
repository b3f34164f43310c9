//! In-memory correlation between Discord and WhatsApp message ids.
//!
//! Every successful relay records a Discord id <-> WhatsApp id pair so
//! reactions and replies can find their counterpart. The table lives
//! only for the process lifetime and is never pruned; a restart starts
//! empty.

use std::collections::{HashMap, HashSet};

use serenity::model::id::MessageId;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    /// Discord message id -> WhatsApp message id.
    forward: HashMap<MessageId, String>,
    /// WhatsApp message id -> Discord message id.
    reverse: HashMap<String, MessageId>,
    /// WhatsApp ids of reactions the bridge itself sent. Used to
    /// suppress their echo when the sidecar plays them back.
    own_reactions: HashSet<String>,
}

/// Bidirectional message-id table plus pending reaction markers.
pub struct CorrelationTable {
    inner: RwLock<Tables>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
        }
    }

    /// Record a correlation right after a successful send. Entries are
    /// written once and never updated.
    pub async fn record(&self, discord_id: MessageId, wa_id: String) {
        let mut tables = self.inner.write().await;
        tables.reverse.insert(wa_id.clone(), discord_id);
        tables.forward.insert(discord_id, wa_id);
    }

    /// WhatsApp id for a Discord message, if the bridge relayed it.
    pub async fn wa_for_discord(&self, discord_id: MessageId) -> Option<String> {
        self.inner.read().await.forward.get(&discord_id).cloned()
    }

    /// Discord id for a WhatsApp message, if the bridge relayed it.
    pub async fn discord_for_wa(&self, wa_id: &str) -> Option<MessageId> {
        self.inner.read().await.reverse.get(wa_id).copied()
    }

    /// Mark a WhatsApp reaction id as sent by the bridge itself.
    pub async fn mark_own_reaction(&self, wa_id: String) {
        self.inner.write().await.own_reactions.insert(wa_id);
    }

    /// Whether the given WhatsApp id belongs to a reaction the bridge
    /// sent. Such events must not echo back to Discord.
    pub async fn is_own_reaction(&self, wa_id: &str) -> bool {
        self.inner.read().await.own_reactions.contains(wa_id)
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_lookup_both_ways() {
        let table = CorrelationTable::new();
        table.record(MessageId::new(10), "WA1".to_string()).await;

        assert_eq!(
            table.wa_for_discord(MessageId::new(10)).await.as_deref(),
            Some("WA1")
        );
        assert_eq!(
            table.discord_for_wa("WA1").await,
            Some(MessageId::new(10))
        );
    }

    #[tokio::test]
    async fn test_unknown_ids_return_none() {
        let table = CorrelationTable::new();

        assert!(table.wa_for_discord(MessageId::new(99)).await.is_none());
        assert!(table.discord_for_wa("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_own_reaction_markers() {
        let table = CorrelationTable::new();
        table.mark_own_reaction("REACT1".to_string()).await;

        assert!(table.is_own_reaction("REACT1").await);
        assert!(!table.is_own_reaction("REACT2").await);
    }
}
