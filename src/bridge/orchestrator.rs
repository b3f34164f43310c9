//! Relay orchestration between WhatsApp and Discord.
//!
//! One task consumes both event streams and drives every send through
//! `ChannelApi` and the live `WaSession`. Failures are per-message:
//! they are logged (and surfaced to the operator where actionable) but
//! never stop the relay loop.

use std::sync::Arc;

use serenity::model::id::ChannelId;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::bridge::mapper::IdentityMapper;
use crate::bridge::state::BridgeState;
use crate::bridge::translator::{translate_discord_text, translate_wa_message};
use crate::common::messages::{
    is_group_jid, DiscordMessageEvent, DiscordReactionEvent, OutFile, WaContent, WaMessageEvent,
    WaReactionEvent,
};
use crate::discord::client::ChannelApi;
use crate::discord::commands::CommandDispatcher;
use crate::discord::handler::GatewayEvent;
use crate::wa::session::ReactionKey;
use crate::wa::{SessionHandle, WaRelayEvent};

/// Sender name used when the account owner wrote the message on their
/// phone.
const OWN_SENDER_NAME: &str = "You";

pub const UNMAPPED_CHANNEL_NOTICE: &str = "Couldn't find the user. Restart the bot, or manually delete this channel and start a new chat using the `start` command.";

pub const REACTION_NOT_CORRELATED_NOTICE: &str =
    "Couldn't send the reaction. You can only react to messages received after the bot went online.";

pub const QUOTE_NOT_FOUND_NOTICE: &str = "Couldn't find the message quoted. You can only reply to messages received after the bot went online. Sending the message without the quoted message.";

/// Single consumer of both event streams.
pub struct RelayOrchestrator {
    state: Arc<BridgeState>,
    mapper: Arc<IdentityMapper>,
    session: SessionHandle,
    api: Arc<dyn ChannelApi>,
    commands: CommandDispatcher,
}

impl RelayOrchestrator {
    pub fn new(
        state: Arc<BridgeState>,
        mapper: Arc<IdentityMapper>,
        session: SessionHandle,
        api: Arc<dyn ChannelApi>,
        commands: CommandDispatcher,
    ) -> Self {
        Self {
            state,
            mapper,
            session,
            api,
            commands,
        }
    }

    /// Run until both streams close or shutdown flips.
    pub async fn run(
        self,
        mut discord_rx: mpsc::UnboundedReceiver<GatewayEvent>,
        mut wa_rx: mpsc::UnboundedReceiver<WaRelayEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Relay orchestrator started");
        loop {
            tokio::select! {
                event = discord_rx.recv() => match event {
                    Some(event) => self.handle_discord(event).await,
                    None => return,
                },
                event = wa_rx.recv() => match event {
                    Some(event) => self.handle_wa(event).await,
                    None => return,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn handle_discord(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { bot_name } => {
                info!(bot = %bot_name, "Discord gateway ready");
            }
            GatewayEvent::Command(event) => self.commands.dispatch(event).await,
            GatewayEvent::Message(event) => self.relay_discord_message(event).await,
            GatewayEvent::Reaction(event) => self.relay_discord_reaction(event).await,
            GatewayEvent::ChannelDeleted(channel) => {
                self.mapper.handle_channel_delete(channel).await;
            }
        }
    }

    async fn handle_wa(&self, event: WaRelayEvent) {
        match event {
            WaRelayEvent::Message(event) => self.relay_wa_message(event).await,
            WaRelayEvent::Reaction(event) => self.relay_wa_reaction(event).await,
        }
    }

    async fn relay_wa_message(&self, event: WaMessageEvent) {
        if !self.state.is_whitelisted(&event.chat_jid).await {
            return;
        }
        if self.state.started_at > event.timestamp {
            return;
        }
        // Sends of the bridge itself echo back from the sidecar with
        // the id they were assigned on send.
        if self.state.correlation.discord_for_wa(&event.id).await.is_some() {
            return;
        }

        let sender_name = if event.from_me {
            OWN_SENDER_NAME.to_string()
        } else {
            self.mapper
                .name_for(&event.sender_jid(), event.push_name.as_deref())
                .await
        };
        let quoted_name = match &event.quoted {
            Some(quote) => self.mapper.name_for(&quote.participant, None).await,
            None => String::new(),
        };
        let group_prefix = self.state.settings.read().await.wa_group_prefix;

        let Some(outbound) = translate_wa_message(&event, &sender_name, &quoted_name, group_prefix)
        else {
            return;
        };

        let hint = if is_group_jid(&event.chat_jid) {
            None
        } else {
            event.push_name.as_deref()
        };
        let binding = match self.mapper.resolve_destination(&event.chat_jid, hint).await {
            Ok(binding) => binding,
            Err(e) => {
                warn!(chat = %event.chat_jid, error = %e, "Failed to resolve a channel for the chat");
                return;
            }
        };

        let avatar_url = if event.from_me {
            None
        } else {
            match self.session.current() {
                Ok(session) => session
                    .profile_picture(&event.sender_jid())
                    .await
                    .unwrap_or_else(|e| {
                        debug!(error = %e, "Profile picture lookup failed");
                        None
                    }),
                Err(_) => None,
            }
        };

        let mut files = Vec::new();
        if outbound.attach_media {
            if let WaContent::Media {
                kind, file_name, ..
            } = &event.content
            {
                let session = match self.session.current() {
                    Ok(session) => session,
                    Err(e) => {
                        warn!(error = %e, "Cannot download media without a session");
                        return;
                    }
                };
                match session.download_media(&event.chat_jid, &event.id).await {
                    Ok(data) => files.push(OutFile {
                        name: file_name
                            .clone()
                            .unwrap_or_else(|| kind.default_file_name().to_string()),
                        data,
                    }),
                    Err(e) => {
                        warn!(id = %event.id, error = %e, "Media download failed");
                        return;
                    }
                }
            }
        }

        let mut chunks = outbound.chunks;
        let last = chunks.pop().unwrap_or_default();
        for chunk in chunks {
            if let Err(e) = self
                .api
                .webhook_send(binding.webhook, &sender_name, avatar_url.clone(), &chunk, Vec::new())
                .await
            {
                warn!(error = %e, "Webhook send failed");
                return;
            }
        }
        match self
            .api
            .webhook_send(binding.webhook, &sender_name, avatar_url, &last, files)
            .await
        {
            Ok(discord_id) => {
                self.state
                    .correlation
                    .record(discord_id, event.id.clone())
                    .await;
            }
            Err(e) => warn!(error = %e, "Webhook send failed"),
        }
    }

    async fn relay_wa_reaction(&self, event: WaReactionEvent) {
        if !self.state.is_whitelisted(&event.chat_jid).await {
            return;
        }
        if self.state.started_at > event.timestamp {
            return;
        }
        if self.state.correlation.is_own_reaction(&event.reaction_id).await {
            return;
        }
        // Removals carry an empty emoji; there is nothing to render.
        if event.emoji.is_empty() {
            return;
        }

        let Some(binding) = self.state.bindings.get(&event.chat_jid).await else {
            return;
        };
        let Some(discord_id) = self.state.correlation.discord_for_wa(&event.target_id).await
        else {
            return;
        };
        if emojis::get(&event.emoji).is_none() {
            debug!(emoji = %event.emoji, "Skipping a reaction emoji Discord cannot render");
            return;
        }
        if let Err(e) = self
            .api
            .add_reaction(binding.channel, discord_id, &event.emoji)
            .await
        {
            warn!(error = %e, "Failed to mirror the reaction");
        }
    }

    async fn relay_discord_message(&self, event: DiscordMessageEvent) {
        // Webhook messages are the bridge's own output; only their
        // attachments and embeds carry anything not yet relayed.
        if event.webhook_authored && event.attachments.is_empty() && event.embeds.is_empty() {
            return;
        }

        let Some(jid) = self.mapper.reverse_resolve(event.channel_id).await else {
            let bridge_owned = match event.parent_category {
                Some(category) => {
                    self.state
                        .settings
                        .read()
                        .await
                        .categories
                        .contains(&category)
                }
                None => false,
            };
            if bridge_owned {
                self.notify_channel(event.channel_id, UNMAPPED_CHANNEL_NOTICE)
                    .await;
            }
            return;
        };

        let session = match self.session.current() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Dropping a Discord message without a session");
                return;
            }
        };

        let (upload, prefix) = {
            let settings = self.state.settings.read().await;
            (settings.upload_attachments, settings.discord_prefix)
        };

        if upload {
            for attachment in &event.attachments {
                let data = match self.api.download_attachment(&attachment.url).await {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(name = %attachment.file_name, error = %e, "Attachment download failed");
                        continue;
                    }
                };
                if let Err(e) = session
                    .send_document(&jid, &attachment.file_name, data)
                    .await
                {
                    warn!(name = %attachment.file_name, error = %e, "Document send failed");
                }
            }
        }

        let quoted_id = match event.reply_to {
            Some(reply_to) => {
                let quoted = self.state.correlation.wa_for_discord(reply_to).await;
                if quoted.is_none() {
                    self.notify_channel(event.channel_id, QUOTE_NOT_FOUND_NOTICE)
                        .await;
                }
                quoted
            }
            None => None,
        };

        if event.embeds.is_empty() {
            let text = translate_discord_text(&event, upload, prefix);
            if text.is_empty() {
                return;
            }
            match session.send_text(&jid, &text, quoted_id.as_deref()).await {
                Ok(wa_id) => self.state.correlation.record(event.id, wa_id).await,
                Err(e) => warn!(error = %e, "Text send failed"),
            }
        } else {
            // Embeds replace the text; each goes out as its JSON
            // rendering.
            for embed in &event.embeds {
                let rendered = embed.to_string();
                match session
                    .send_text(&jid, &rendered, quoted_id.as_deref())
                    .await
                {
                    Ok(wa_id) => self.state.correlation.record(event.id, wa_id).await,
                    Err(e) => warn!(error = %e, "Embed send failed"),
                }
            }
        }
    }

    async fn relay_discord_reaction(&self, event: DiscordReactionEvent) {
        let Some(target_id) = self.state.correlation.wa_for_discord(event.message_id).await
        else {
            self.notify_channel(event.channel_id, REACTION_NOT_CORRELATED_NOTICE)
                .await;
            return;
        };
        let Some(jid) = self.mapper.reverse_resolve(event.channel_id).await else {
            self.notify_channel(event.channel_id, UNMAPPED_CHANNEL_NOTICE)
                .await;
            return;
        };

        // A non-webhook target was typed in Discord and relayed out as
        // the account owner; the owner's phone messages relay back in
        // under the reserved sender name.
        let from_me =
            !event.target_webhook_authored || event.target_author_name == OWN_SENDER_NAME;
        let participant = if is_group_jid(&jid) {
            self.state.jid_for_name(&event.target_author_name).await
        } else {
            None
        };
        let key = ReactionKey::new(target_id, from_me, jid, participant);

        let session = match self.session.current() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Dropping a reaction without a session");
                return;
            }
        };
        let emoji = if event.removed { "" } else { event.emoji.as_str() };
        match session.send_reaction(&key, emoji).await {
            Ok(reaction_id) => self.state.correlation.mark_own_reaction(reaction_id).await,
            Err(e) => warn!(error = %e, "Reaction send failed"),
        }
    }

    /// Per-channel operator notices; failures there only get logged.
    async fn notify_channel(&self, channel: ChannelId, text: &str) {
        if let Err(e) = self.api.channel_send(channel, text).await {
            warn!(error = %e, "Channel notice failed");
        }
    }
}
