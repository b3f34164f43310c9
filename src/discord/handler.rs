//! Discord gateway event handling.
//!
//! `EventForwarder` reduces raw serenity events to the bridge's own
//! event types and hands them to the relay orchestrator over a channel.
//! No relay logic lives here; the handler only filters and reshapes.

use std::sync::Arc;

use serenity::async_trait;
use serenity::model::channel::{GuildChannel, Message, Reaction, ReactionType};
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, GuildId};
use serenity::prelude::*;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bridge::state::BridgeState;
use crate::common::messages::{
    CommandEvent, DiscordAttachment, DiscordMessageEvent, DiscordReactionEvent,
};

/// Gateway events after reduction, in the order they arrived.
#[derive(Debug)]
pub enum GatewayEvent {
    Ready { bot_name: String },
    Command(CommandEvent),
    Message(DiscordMessageEvent),
    Reaction(DiscordReactionEvent),
    ChannelDeleted(ChannelId),
}

/// Serenity event handler forwarding reduced events to the relay.
pub struct EventForwarder {
    state: Arc<BridgeState>,
    guild: GuildId,
    events_tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl EventForwarder {
    pub fn new(
        state: Arc<BridgeState>,
        guild: GuildId,
        events_tx: mpsc::UnboundedSender<GatewayEvent>,
    ) -> Self {
        Self {
            state,
            guild,
            events_tx,
        }
    }

    async fn forward_reaction(&self, ctx: Context, reaction: Reaction, removed: bool) {
        if reaction.guild_id != Some(self.guild) {
            return;
        }
        let own_id = ctx.cache.current_user().id;
        if reaction.user_id == Some(own_id) {
            return;
        }
        // Custom guild emoji have no WhatsApp counterpart.
        let emoji = match &reaction.emoji {
            ReactionType::Unicode(emoji) => emoji.clone(),
            _ => return,
        };

        let message = match reaction.message(&ctx).await {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to fetch the reacted-to message");
                return;
            }
        };

        let target_author_name = message
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .unwrap_or_else(|| message.author.name.clone());

        let _ = self.events_tx.send(GatewayEvent::Reaction(DiscordReactionEvent {
            channel_id: reaction.channel_id,
            message_id: reaction.message_id,
            emoji,
            removed,
            target_webhook_authored: message.webhook_id.is_some(),
            target_author_name,
            timestamp: chrono::Utc::now().timestamp(),
        }));
    }
}

#[async_trait]
impl EventHandler for EventForwarder {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
        let _ = self.events_tx.send(GatewayEvent::Ready {
            bot_name: ready.user.name.clone(),
        });
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.guild_id != Some(self.guild) {
            return;
        }
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        if msg.channel_id == self.state.control_channel().await {
            let created_ms = (msg.timestamp.unix_timestamp_nanos() / 1_000_000) as i64;
            let _ = self.events_tx.send(GatewayEvent::Command(CommandEvent {
                content: msg.content.clone(),
                created_ms,
            }));
            return;
        }

        let parent_category = ctx
            .cache
            .channel(msg.channel_id)
            .and_then(|channel| channel.parent_id);

        let author_name = msg
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .unwrap_or_else(|| msg.author.name.clone());

        let attachments = msg
            .attachments
            .iter()
            .map(|attachment| DiscordAttachment {
                url: attachment.url.clone(),
                file_name: attachment.filename.clone(),
                size: attachment.size as u64,
            })
            .collect();

        let embeds = msg
            .embeds
            .iter()
            .filter_map(|embed| serde_json::to_value(embed).ok())
            .collect();

        let _ = self.events_tx.send(GatewayEvent::Message(DiscordMessageEvent {
            id: msg.id,
            channel_id: msg.channel_id,
            parent_category,
            author_name,
            webhook_authored: msg.webhook_id.is_some(),
            content: msg.content.clone(),
            attachments,
            embeds,
            reply_to: msg.message_reference.as_ref().and_then(|r| r.message_id),
            timestamp: msg.timestamp.unix_timestamp(),
        }));
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        self.forward_reaction(ctx, reaction, false).await;
    }

    async fn reaction_remove(&self, ctx: Context, reaction: Reaction) {
        self.forward_reaction(ctx, reaction, true).await;
    }

    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        if channel.guild_id != self.guild {
            return;
        }
        let _ = self
            .events_tx
            .send(GatewayEvent::ChannelDeleted(channel.id));
    }
}
