//! Shared bridge state.
//!
//! All mutable runtime state lives in a single `BridgeState` passed
//! around by `Arc`. Relay streams, the command dispatcher and the
//! session supervisor all work against this one object; there are no
//! globals.

use std::collections::HashMap;

use serenity::model::id::ChannelId;
use tokio::sync::RwLock;

use crate::bridge::correlation::CorrelationTable;
use crate::bridge::mapper::BindingTable;
use crate::common::messages::{Contact, Jid};
use crate::config::Config;

/// Operator-tunable settings.
///
/// Written only by the command dispatcher, except `categories` which
/// is also pruned when a Discord channel is deleted.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Prefix WhatsApp group messages with `[sender] `.
    pub wa_group_prefix: bool,
    /// Prefix messages sent to WhatsApp with `[author] `.
    pub discord_prefix: bool,
    /// Upload Discord attachments to WhatsApp instead of linking them.
    pub upload_attachments: bool,
    /// Bridge-owned category IDs chat channels are created under.
    pub categories: Vec<ChannelId>,
    /// Channel where operator commands and notices go.
    pub control_channel: ChannelId,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            wa_group_prefix: config.bridge.wa_group_prefix,
            discord_prefix: config.bridge.discord_prefix,
            upload_attachments: config.bridge.upload_attachments,
            categories: config
                .bridge
                .categories
                .iter()
                .map(|id| ChannelId::new(*id))
                .collect(),
            control_channel: ChannelId::new(config.discord.control_channel),
        }
    }
}

/// Shared mutable state of the bridge.
pub struct BridgeState {
    pub settings: RwLock<Settings>,
    /// Allow-list of JIDs. Non-empty means only listed chats relay.
    whitelist: RwLock<Vec<Jid>>,
    /// JID -> display name, populated from sidecar contact syncs.
    contacts: RwLock<HashMap<Jid, String>>,
    pub correlation: CorrelationTable,
    pub bindings: BindingTable,
    /// Unix timestamp (seconds) of process start. Events older than
    /// this are never relayed.
    pub started_at: i64,
}

impl BridgeState {
    pub fn new(config: &Config) -> Self {
        Self {
            settings: RwLock::new(Settings::from_config(config)),
            whitelist: RwLock::new(dedup_ordered(config.bridge.whitelist.clone())),
            contacts: RwLock::new(HashMap::new()),
            correlation: CorrelationTable::new(),
            bindings: BindingTable::new(),
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    pub async fn control_channel(&self) -> ChannelId {
        self.settings.read().await.control_channel
    }

    /// Whitelist gate: an empty whitelist admits every chat.
    pub async fn is_whitelisted(&self, jid: &str) -> bool {
        let whitelist = self.whitelist.read().await;
        whitelist.is_empty() || whitelist.iter().any(|entry| entry == jid)
    }

    pub async fn whitelist_is_active(&self) -> bool {
        !self.whitelist.read().await.is_empty()
    }

    pub async fn whitelist_snapshot(&self) -> Vec<Jid> {
        self.whitelist.read().await.clone()
    }

    /// Append a JID to the whitelist, keeping entries unique and ordered.
    pub async fn add_to_whitelist(&self, jid: &str) {
        let mut whitelist = self.whitelist.write().await;
        if !whitelist.iter().any(|entry| entry == jid) {
            whitelist.push(jid.to_string());
        }
    }

    pub async fn remove_from_whitelist(&self, jid: &str) {
        self.whitelist.write().await.retain(|entry| entry != jid);
    }

    pub async fn contact_name(&self, jid: &str) -> Option<String> {
        self.contacts.read().await.get(jid).cloned()
    }

    /// Merge a contact/group sync from the sidecar.
    pub async fn update_contacts(&self, entries: Vec<Contact>) {
        let mut contacts = self.contacts.write().await;
        for entry in entries {
            contacts.insert(entry.jid, entry.name);
        }
    }

    /// All known contact names, sorted for display.
    pub async fn contact_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contacts.read().await.values().cloned().collect();
        names.sort();
        names
    }

    /// Find the JID of a contact by display name, case-insensitive.
    pub async fn jid_for_name(&self, name: &str) -> Option<Jid> {
        let wanted = name.to_lowercase();
        self.contacts
            .read()
            .await
            .iter()
            .find(|(_, contact_name)| contact_name.to_lowercase() == wanted)
            .map(|(jid, _)| jid.clone())
    }

    /// Drop a category id after its Discord channel was deleted.
    pub async fn remove_category(&self, category: ChannelId) {
        self.settings
            .write()
            .await
            .categories
            .retain(|id| *id != category);
    }
}

fn dedup_ordered(entries: Vec<Jid>) -> Vec<Jid> {
    let mut seen = Vec::new();
    for entry in entries {
        if !seen.contains(&entry) {
            seen.push(entry);
        }
    }
    seen
}
