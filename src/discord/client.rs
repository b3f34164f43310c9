//! Discord client plumbing.
//!
//! `ChannelApi` is the narrow surface the rest of the bridge uses to
//! act on Discord; `SerenityChannelApi` backs it with serenity's HTTP
//! client. `DiscordBot` owns the gateway connection and keeps it alive
//! with backoff, forwarding events through the handler.

use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use serenity::async_trait;
use serenity::builder::{CreateAttachment, CreateChannel, CreateWebhook, ExecuteWebhook};
use serenity::http::{Http, HttpBuilder};
use serenity::model::channel::{ChannelType, ReactionType};
use serenity::model::id::{ChannelId, GuildId, MessageId, WebhookId};
use serenity::prelude::*;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::bridge::state::BridgeState;
use crate::common::error::{DiscordError, DiscordResult};
use crate::common::messages::OutFile;
use crate::config::Config;
use crate::discord::handler::{EventForwarder, GatewayEvent};

/// Name given to the webhooks the bridge creates.
const WEBHOOK_NAME: &str = "Ferryman";

/// Discord operations the bridge needs. Narrow on purpose so relay
/// logic can run against a mock in tests.
#[async_trait]
pub trait ChannelApi: Send + Sync {
    /// Create a channel category under the guild.
    async fn create_category(&self, name: &str) -> DiscordResult<ChannelId>;

    /// Create a text channel under a category, plus the webhook the
    /// bridge impersonates senders through.
    async fn create_chat_channel(
        &self,
        name: &str,
        category: ChannelId,
    ) -> DiscordResult<(ChannelId, WebhookId)>;

    /// Send through a webhook, impersonating `username`.
    async fn webhook_send(
        &self,
        webhook: WebhookId,
        username: &str,
        avatar_url: Option<String>,
        text: &str,
        files: Vec<OutFile>,
    ) -> DiscordResult<MessageId>;

    /// Plain send as the bot user.
    async fn channel_send(&self, channel: ChannelId, text: &str) -> DiscordResult<MessageId>;

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> DiscordResult<()>;

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> DiscordResult<()>;

    /// Fetch an attachment body from Discord's CDN.
    async fn download_attachment(&self, url: &str) -> DiscordResult<Vec<u8>>;
}

/// `ChannelApi` backed by serenity's HTTP client.
pub struct SerenityChannelApi {
    http: Arc<Http>,
    guild: GuildId,
    download: reqwest::Client,
}

impl SerenityChannelApi {
    pub fn new(http: Arc<Http>, guild: GuildId) -> Self {
        Self {
            http,
            guild,
            download: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelApi for SerenityChannelApi {
    async fn create_category(&self, name: &str) -> DiscordResult<ChannelId> {
        let category = self
            .guild
            .create_channel(
                &self.http,
                CreateChannel::new(name).kind(ChannelType::Category),
            )
            .await?;
        Ok(category.id)
    }

    async fn create_chat_channel(
        &self,
        name: &str,
        category: ChannelId,
    ) -> DiscordResult<(ChannelId, WebhookId)> {
        let channel = self
            .guild
            .create_channel(
                &self.http,
                CreateChannel::new(name)
                    .kind(ChannelType::Text)
                    .category(category),
            )
            .await?;
        let webhook = channel
            .id
            .create_webhook(&self.http, CreateWebhook::new(WEBHOOK_NAME))
            .await?;
        Ok((channel.id, webhook.id))
    }

    async fn webhook_send(
        &self,
        webhook: WebhookId,
        username: &str,
        avatar_url: Option<String>,
        text: &str,
        files: Vec<OutFile>,
    ) -> DiscordResult<MessageId> {
        let webhook = self.http.get_webhook(webhook).await?;

        let mut builder = ExecuteWebhook::new().username(username).content(text);
        if let Some(url) = avatar_url {
            builder = builder.avatar_url(url);
        }
        builder = builder.add_files(
            files
                .into_iter()
                .map(|file| CreateAttachment::bytes(file.data, file.name)),
        );

        let message = webhook.execute(&self.http, true, builder).await?;
        message
            .map(|m| m.id)
            .ok_or_else(|| DiscordError::SendFailed {
                message: "webhook execution returned no message".to_string(),
            })
    }

    async fn channel_send(&self, channel: ChannelId, text: &str) -> DiscordResult<MessageId> {
        let message = channel.say(&self.http, text).await?;
        Ok(message.id)
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> DiscordResult<()> {
        self.http
            .create_reaction(channel, message, &ReactionType::Unicode(emoji.to_string()))
            .await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> DiscordResult<()> {
        self.http
            .delete_reaction_me(channel, message, &ReactionType::Unicode(emoji.to_string()))
            .await?;
        Ok(())
    }

    async fn download_attachment(&self, url: &str) -> DiscordResult<Vec<u8>> {
        let download = |message: String| DiscordError::AttachmentDownload {
            name: url.to_string(),
            message,
        };
        let response = self
            .download
            .get(url)
            .send()
            .await
            .map_err(|e| download(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download(format!("HTTP {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| download(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

async fn build_client(
    token: &str,
    state: Arc<BridgeState>,
    guild: GuildId,
    events_tx: mpsc::UnboundedSender<GatewayEvent>,
) -> DiscordResult<Client> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| DiscordError::ConnectionFailed {
            message: e.to_string(),
        })?;

    let http = HttpBuilder::new(token).client(reqwest_client).build();

    let forwarder = EventForwarder::new(state, guild, events_tx);
    let client = serenity::client::ClientBuilder::new_with_http(http, intents)
        .event_handler(forwarder)
        .await?;
    Ok(client)
}

/// Owns the gateway connection.
pub struct DiscordBot {
    client: Option<Client>,
    token: String,
    state: Arc<BridgeState>,
    guild: GuildId,
    events_tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl DiscordBot {
    /// Build the gateway client and the HTTP-backed `ChannelApi`
    /// sharing its connection pool.
    pub async fn connect(
        config: &Config,
        state: Arc<BridgeState>,
        events_tx: mpsc::UnboundedSender<GatewayEvent>,
    ) -> DiscordResult<(Self, Arc<SerenityChannelApi>)> {
        let guild = GuildId::new(config.discord.guild_id);
        let client = build_client(&config.discord.token, state.clone(), guild, events_tx.clone())
            .await?;
        let api = Arc::new(SerenityChannelApi::new(client.http.clone(), guild));
        Ok((
            Self {
                client: Some(client),
                token: config.discord.token.clone(),
                state,
                guild,
                events_tx,
            },
            api,
        ))
    }

    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let shard_manager = self.client.as_ref().map(|c| c.shard_manager.clone());

        tokio::select! {
            _ = self.run_connection() => {}
            _ = async {
                loop {
                    shutdown_rx.changed().await.ok();
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                if let Some(ref manager) = shard_manager {
                    info!("Initiating graceful Discord shutdown...");
                    manager.shutdown_all().await;
                    info!("Discord shutdown complete");
                }
            } => {}
        }
        info!("Discord task ended");
    }

    async fn run_connection(&mut self) {
        /// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
        fn discord_backoff() -> impl Iterator<Item = Duration> {
            backon::ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(5))
                .with_max_delay(Duration::from_secs(300))
                .with_factor(1.1)
                .with_jitter()
                .without_max_times()
                .build()
        }

        let mut backoff = discord_backoff();

        loop {
            info!("Connecting to Discord...");

            let mut client = match self.client.take() {
                Some(client) => client,
                None => {
                    // serenity handles most reconnections itself; this
                    // path only runs after a fatal gateway error.
                    match build_client(
                        &self.token,
                        self.state.clone(),
                        self.guild,
                        self.events_tx.clone(),
                    )
                    .await
                    {
                        Ok(client) => {
                            backoff = discord_backoff();
                            client
                        }
                        Err(e) => {
                            error!("Failed to rebuild Discord client: {}", e);
                            let delay = backoff.next().unwrap_or(Duration::from_secs(300));
                            warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                            sleep(delay).await;
                            continue;
                        }
                    }
                }
            };

            match client.start().await {
                Ok(()) => {
                    info!("Discord client disconnected normally");
                    return;
                }
                Err(e) => {
                    error!("Discord client error: {}", e);
                    let delay = backoff.next().unwrap_or(Duration::from_secs(300));
                    warn!(
                        "Discord disconnected. Reconnecting in {:.1}s...",
                        delay.as_secs_f64(),
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
