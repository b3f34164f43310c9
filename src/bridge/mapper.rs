//! Identity mapping between WhatsApp JIDs and Discord channels.
//!
//! Each WhatsApp chat maps to exactly one Discord channel with a
//! webhook the bridge impersonates senders through. Channels are
//! created lazily under a bridge-owned category the first time a chat
//! needs a destination.

use std::collections::HashMap;
use std::sync::Arc;

use serenity::model::id::{ChannelId, WebhookId};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::bridge::state::BridgeState;
use crate::common::error::{RelayError, RelayResult};
use crate::common::messages::{jid_user_part, Jid};
use crate::discord::client::ChannelApi;

/// Name of the category created when none is configured.
const DEFAULT_CATEGORY_NAME: &str = "WhatsApp";

/// A resolved destination for a WhatsApp chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub channel: ChannelId,
    pub webhook: WebhookId,
}

#[derive(Default)]
struct BindingMaps {
    by_jid: HashMap<Jid, Binding>,
    by_channel: HashMap<ChannelId, Jid>,
}

/// Bidirectional JID <-> channel binding storage.
pub struct BindingTable {
    inner: RwLock<BindingMaps>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BindingMaps::default()),
        }
    }

    pub async fn get(&self, jid: &str) -> Option<Binding> {
        self.inner.read().await.by_jid.get(jid).copied()
    }

    pub async fn jid_for_channel(&self, channel: ChannelId) -> Option<Jid> {
        self.inner.read().await.by_channel.get(&channel).cloned()
    }

    pub async fn insert(&self, jid: Jid, binding: Binding) {
        let mut maps = self.inner.write().await;
        maps.by_channel.insert(binding.channel, jid.clone());
        maps.by_jid.insert(jid, binding);
    }

    /// Remove the binding for a deleted channel, returning its JID.
    pub async fn remove_channel(&self, channel: ChannelId) -> Option<Jid> {
        let mut maps = self.inner.write().await;
        let jid = maps.by_channel.remove(&channel)?;
        maps.by_jid.remove(&jid);
        Some(jid)
    }

    pub async fn jids(&self) -> Vec<Jid> {
        self.inner.read().await.by_jid.keys().cloned().collect()
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves WhatsApp chats to Discord destinations, creating channels
/// and webhooks on demand.
pub struct IdentityMapper {
    state: Arc<BridgeState>,
    api: Arc<dyn ChannelApi>,
    /// Serializes channel creation so concurrent resolutions of the
    /// same JID produce a single channel.
    create_lock: Mutex<()>,
}

impl IdentityMapper {
    pub fn new(state: Arc<BridgeState>, api: Arc<dyn ChannelApi>) -> Self {
        Self {
            state,
            api,
            create_lock: Mutex::new(()),
        }
    }

    /// Display name for a JID: push-name hint first, then the synced
    /// contact name, then the bare user part of the JID.
    pub async fn name_for(&self, jid: &str, hint: Option<&str>) -> String {
        if let Some(hint) = hint {
            if !hint.is_empty() {
                return hint.to_string();
            }
        }
        if let Some(name) = self.state.contact_name(jid).await {
            return name;
        }
        jid_user_part(jid).to_string()
    }

    /// Existing binding for a JID, or a freshly created channel plus
    /// webhook. Idempotent per JID.
    pub async fn resolve_destination(
        &self,
        jid: &str,
        name_hint: Option<&str>,
    ) -> RelayResult<Binding> {
        if let Some(binding) = self.state.bindings.get(jid).await {
            return Ok(binding);
        }

        let _guard = self.create_lock.lock().await;
        // Re-check: another resolution may have won the race.
        if let Some(binding) = self.state.bindings.get(jid).await {
            return Ok(binding);
        }

        let category = self.ensure_category().await.map_err(|e| {
            RelayError::DestinationUnavailable {
                jid: jid.to_string(),
                message: e,
            }
        })?;

        let name = self.name_for(jid, name_hint).await;
        let channel_name = sanitize_channel_name(&name);
        let (channel, webhook) = self
            .api
            .create_chat_channel(&channel_name, category)
            .await
            .map_err(|e| RelayError::DestinationUnavailable {
                jid: jid.to_string(),
                message: e.to_string(),
            })?;

        let binding = Binding { channel, webhook };
        self.state.bindings.insert(jid.to_string(), binding).await;
        info!(jid, channel = channel.get(), "Created bridge channel");
        Ok(binding)
    }

    /// JID bound to a Discord channel, if any.
    pub async fn reverse_resolve(&self, channel: ChannelId) -> Option<Jid> {
        self.state.bindings.jid_for_channel(channel).await
    }

    /// Cleanup after a Discord channel was deleted: drop its binding
    /// and forget it as a category.
    pub async fn handle_channel_delete(&self, channel: ChannelId) {
        if let Some(jid) = self.state.bindings.remove_channel(channel).await {
            info!(jid, channel = channel.get(), "Binding removed with channel");
        }
        self.state.remove_category(channel).await;
    }

    /// First known bridge category, creating one when none exists.
    async fn ensure_category(&self) -> Result<ChannelId, String> {
        if let Some(category) = self.state.settings.read().await.categories.first() {
            return Ok(*category);
        }

        let category = self
            .api
            .create_category(DEFAULT_CATEGORY_NAME)
            .await
            .map_err(|e| e.to_string())?;
        self.state.settings.write().await.categories.push(category);
        info!(category = category.get(), "Created bridge category");
        Ok(category)
    }
}

/// Reduce a display name to Discord's channel-name charset.
pub fn sanitize_channel_name(name: &str) -> String {
    let mut sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    sanitized.truncate(100);
    if sanitized.is_empty() {
        "wa-chat".to_string()
    } else {
        sanitized
    }
}
