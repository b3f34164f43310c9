//! Operator commands typed in the control channel.
//!
//! Commands are case-insensitive; replies always go back to the
//! control channel. Failures that the operator cannot act on are only
//! logged.

use std::sync::Arc;

use fancy_regex::Regex;
use serenity::model::id::ChannelId;
use tracing::warn;

use crate::bridge::mapper::IdentityMapper;
use crate::bridge::state::BridgeState;
use crate::common::messages::{CommandEvent, USER_JID_SUFFIX};
use crate::discord::client::ChannelApi;
use crate::wa::SessionHandle;

const HELP_TEXT: &str = "\
`start <number with country code or name>`: Starts a new conversation.
`list`: Lists existing chats.
`list <chat name to search>`: Finds chats that contain the given argument.
`listWhitelist`: Lists all whitelisted conversations.
`addToWhitelist <channel name>`: Adds specified conversation to the whitelist.
`removeFromWhitelist <channel name>`: Removes specified conversation from the whitelist.
`resync`: Re-syncs your contacts and groups.
`enableWAUpload`: Starts uploading attachments sent to Discord to WhatsApp.
`disableWAUpload`: Stop uploading attachments sent to Discord to WhatsApp.
`enableDCPrefix`: Starts adding your Discord username to messages sent to WhatsApp.
`disableDCPrefix`: Stops adding your Discord username to messages sent to WhatsApp.
`enableWAPrefix`: Starts adding sender's name to messages sent to Discord.
`disableWAPrefix`: Stops adding sender's name to messages sent to Discord.
`ping`: Sends \"Pong! <Now - Time Message Sent>ms\" back.";

/// Parses and executes control-channel commands.
pub struct CommandDispatcher {
    state: Arc<BridgeState>,
    mapper: Arc<IdentityMapper>,
    session: SessionHandle,
    api: Arc<dyn ChannelApi>,
    channel_mention: Regex,
}

impl CommandDispatcher {
    pub fn new(
        state: Arc<BridgeState>,
        mapper: Arc<IdentityMapper>,
        session: SessionHandle,
        api: Arc<dyn ChannelApi>,
    ) -> Self {
        Self {
            state,
            mapper,
            session,
            api,
            channel_mention: Regex::new(r"<#(\d+)>").unwrap(),
        }
    }

    pub async fn dispatch(&self, event: CommandEvent) {
        let lowered = event.content.to_lowercase();
        let mut tokens = lowered.split(' ');
        let command = tokens.next().unwrap_or("");
        let params: Vec<&str> = tokens.collect();

        match command {
            "ping" => self.ping(&event).await,
            "start" => self.start(&params).await,
            "list" => self.list(&params).await,
            "listwhitelist" => self.list_whitelist().await,
            "addtowhitelist" => self.update_whitelist(&event.content, &params, true).await,
            "removefromwhitelist" => self.update_whitelist(&event.content, &params, false).await,
            "enabledcprefix" => self.set_discord_prefix(true).await,
            "disabledcprefix" => self.set_discord_prefix(false).await,
            "enablewaprefix" => self.set_wa_prefix(true).await,
            "disablewaprefix" => self.set_wa_prefix(false).await,
            "enablewaupload" => self.set_wa_upload(true).await,
            "disablewaupload" => self.set_wa_upload(false).await,
            "resync" => self.resync().await,
            "help" => self.notify(HELP_TEXT).await,
            _ => {
                self.notify(&format!(
                    "Unknown command: `{}`\nType `help` to see available commands",
                    event.content
                ))
                .await;
            }
        }
    }

    async fn ping(&self, event: &CommandEvent) {
        let latency = chrono::Utc::now().timestamp_millis() - event.created_ms;
        self.notify(&format!("Pong {latency}ms!")).await;
    }

    /// Open (or reopen) a chat channel for a phone number or a synced
    /// contact name. Newly started chats join an active whitelist so
    /// they are not filtered right back out.
    async fn start(&self, params: &[&str]) {
        if params.is_empty() {
            self.notify(
                "Please enter a phone number or name. Usage: `start <number with country code or name>`.",
            )
            .await;
            return;
        }

        let query = params.join(" ");
        let jid = if params[0].parse::<u64>().is_ok() {
            format!("{}{}", params[0], USER_JID_SUFFIX)
        } else {
            match self.state.jid_for_name(&query).await {
                Some(jid) => jid,
                None => {
                    self.notify(&format!("Couldn't find `{query}`.")).await;
                    return;
                }
            }
        };

        if let Err(e) = self.mapper.resolve_destination(&jid, None).await {
            warn!(error = %e, jid, "Failed to open a chat channel");
            return;
        }
        if self.state.whitelist_is_active().await {
            self.state.add_to_whitelist(&jid).await;
        }
    }

    async fn list(&self, params: &[&str]) {
        let query = params.join(" ");
        let names: Vec<String> = self
            .state
            .contact_names()
            .await
            .into_iter()
            .filter(|name| name.to_lowercase().contains(&query))
            .collect();

        if names.is_empty() {
            self.notify("No results were found.").await;
        } else {
            self.notify(&format!("```{}```", names.join("\n"))).await;
        }
    }

    async fn list_whitelist(&self) {
        let jids = self.state.whitelist_snapshot().await;
        if jids.is_empty() {
            self.notify("Whitelist is empty/inactive.").await;
            return;
        }

        let mut names = Vec::with_capacity(jids.len());
        for jid in &jids {
            names.push(self.mapper.name_for(jid, None).await);
        }
        self.notify(&format!("```{}```", names.join("\n"))).await;
    }

    async fn update_whitelist(&self, content: &str, params: &[&str], add: bool) {
        let usage = if add {
            "Please enter a valid channel name. Usage: `addToWhitelist #<target channel>`."
        } else {
            "Please enter a valid channel name. Usage: `removeFromWhitelist #<target channel>`."
        };

        let channel = match self.mentioned_channel(content) {
            Some(channel) if params.len() == 1 => channel,
            _ => {
                self.notify(usage).await;
                return;
            }
        };

        let Some(jid) = self.mapper.reverse_resolve(channel).await else {
            self.notify("Couldn't find a chat with the given channel.")
                .await;
            return;
        };

        if add {
            self.state.add_to_whitelist(&jid).await;
            self.notify("Added to the whitelist!").await;
        } else {
            self.state.remove_from_whitelist(&jid).await;
            self.notify("Removed from the whitelist!").await;
        }
    }

    fn mentioned_channel(&self, content: &str) -> Option<ChannelId> {
        let captures = self.channel_mention.captures(content).ok().flatten()?;
        let id = captures.get(1)?.as_str().parse::<u64>().ok()?;
        if id == 0 {
            return None;
        }
        Some(ChannelId::new(id))
    }

    async fn set_discord_prefix(&self, enabled: bool) {
        self.state.settings.write().await.discord_prefix = enabled;
        self.notify(if enabled {
            "Discord username prefix enabled!"
        } else {
            "Discord username prefix disabled!"
        })
        .await;
    }

    async fn set_wa_prefix(&self, enabled: bool) {
        self.state.settings.write().await.wa_group_prefix = enabled;
        self.notify(if enabled {
            "WhatsApp name prefix enabled!"
        } else {
            "WhatsApp name prefix disabled!"
        })
        .await;
    }

    async fn set_wa_upload(&self, enabled: bool) {
        self.state.settings.write().await.upload_attachments = enabled;
        self.notify(if enabled {
            "Enabled uploading files to WhatsApp!"
        } else {
            "Disabled uploading files to WhatsApp!"
        })
        .await;
    }

    async fn resync(&self) {
        let session = match self.session.current() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Resync requested without a session");
                return;
            }
        };
        match session.resync().await {
            Ok(()) => self.notify("Re-synced!").await,
            Err(e) => warn!(error = %e, "Contact resync failed"),
        }
    }

    async fn notify(&self, text: &str) {
        let channel = self.state.control_channel().await;
        if let Err(e) = self.api.channel_send(channel, text).await {
            warn!(error = %e, "Command reply failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serenity::async_trait;
    use serenity::model::id::{MessageId, WebhookId};
    use tokio::sync::watch;

    use crate::common::error::{DiscordResult, SessionResult};
    use crate::common::messages::{Contact, OutFile};
    use crate::config::types::{BridgeOptions, DiscordConfig, WhatsAppConfig};
    use crate::config::Config;
    use crate::wa::session::{ReactionKey, WaSession};

    #[derive(Default)]
    struct RecordingApi {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingApi {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelApi for RecordingApi {
        async fn create_category(&self, _name: &str) -> DiscordResult<ChannelId> {
            Ok(ChannelId::new(500))
        }

        async fn create_chat_channel(
            &self,
            _name: &str,
            _category: ChannelId,
        ) -> DiscordResult<(ChannelId, WebhookId)> {
            Ok((ChannelId::new(1001), WebhookId::new(2001)))
        }

        async fn webhook_send(
            &self,
            _webhook: WebhookId,
            _username: &str,
            _avatar_url: Option<String>,
            _text: &str,
            _files: Vec<OutFile>,
        ) -> DiscordResult<MessageId> {
            Ok(MessageId::new(1))
        }

        async fn channel_send(&self, _channel: ChannelId, text: &str) -> DiscordResult<MessageId> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(MessageId::new(1))
        }

        async fn add_reaction(
            &self,
            _channel: ChannelId,
            _message: MessageId,
            _emoji: &str,
        ) -> DiscordResult<()> {
            Ok(())
        }

        async fn remove_reaction(
            &self,
            _channel: ChannelId,
            _message: MessageId,
            _emoji: &str,
        ) -> DiscordResult<()> {
            Ok(())
        }

        async fn download_attachment(&self, _url: &str) -> DiscordResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingSession {
        resyncs: Mutex<u32>,
    }

    #[async_trait]
    impl WaSession for RecordingSession {
        async fn send_text(
            &self,
            _jid: &str,
            _text: &str,
            _quoted_id: Option<&str>,
        ) -> SessionResult<String> {
            Ok("MSG".to_string())
        }

        async fn send_document(
            &self,
            _jid: &str,
            _file_name: &str,
            _data: Vec<u8>,
        ) -> SessionResult<String> {
            Ok("MSG".to_string())
        }

        async fn send_reaction(&self, _key: &ReactionKey, _emoji: &str) -> SessionResult<String> {
            Ok("MSG".to_string())
        }

        async fn download_media(
            &self,
            _chat_jid: &str,
            _message_id: &str,
        ) -> SessionResult<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn profile_picture(&self, _jid: &str) -> SessionResult<Option<String>> {
            Ok(None)
        }

        async fn resync(&self) -> SessionResult<()> {
            *self.resyncs.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct Fixture {
        state: Arc<BridgeState>,
        mapper: Arc<IdentityMapper>,
        api: Arc<RecordingApi>,
        session: Arc<RecordingSession>,
        dispatcher: CommandDispatcher,
    }

    fn make_fixture() -> Fixture {
        let state = Arc::new(BridgeState::new(&Config {
            discord: DiscordConfig {
                token: "token".to_string(),
                guild_id: 1,
                control_channel: 42,
            },
            whatsapp: WhatsAppConfig {
                sidecar_url: "ws://127.0.0.1:3000".to_string(),
            },
            bridge: BridgeOptions::default(),
        }));
        let api = Arc::new(RecordingApi::default());
        let mapper = Arc::new(IdentityMapper::new(state.clone(), api.clone()));
        let session = Arc::new(RecordingSession::default());
        let (_tx, rx) = watch::channel(Some(session.clone() as Arc<dyn WaSession>));
        let dispatcher = CommandDispatcher::new(
            state.clone(),
            mapper.clone(),
            SessionHandle { rx },
            api.clone(),
        );
        Fixture {
            state,
            mapper,
            api,
            session,
            dispatcher,
        }
    }

    fn command(content: &str) -> CommandEvent {
        CommandEvent {
            content: content.to_string(),
            created_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[tokio::test]
    async fn test_ping_replies_with_latency() {
        let fixture = make_fixture();

        fixture.dispatcher.dispatch(command("ping")).await;

        let sent = fixture.api.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Pong "));
        assert!(sent[0].ends_with("ms!"));
    }

    #[tokio::test]
    async fn test_unknown_command_echoes_original_case() {
        let fixture = make_fixture();

        fixture.dispatcher.dispatch(command("Frobnicate Now")).await;

        assert_eq!(
            fixture.api.sent(),
            vec![
                "Unknown command: `Frobnicate Now`\nType `help` to see available commands"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_help_lists_every_command() {
        let fixture = make_fixture();

        fixture.dispatcher.dispatch(command("help")).await;

        let sent = fixture.api.sent();
        assert_eq!(sent, vec![HELP_TEXT.to_string()]);
        assert_eq!(sent[0].lines().count(), 14);
    }

    #[tokio::test]
    async fn test_start_requires_a_target() {
        let fixture = make_fixture();

        fixture.dispatcher.dispatch(command("start")).await;

        assert_eq!(
            fixture.api.sent(),
            vec![
                "Please enter a phone number or name. Usage: `start <number with country code or name>`."
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_start_with_number_binds_and_whitelists() {
        let fixture = make_fixture();
        fixture.state.add_to_whitelist("999@s.whatsapp.net").await;

        fixture.dispatcher.dispatch(command("start 491234")).await;

        assert!(fixture
            .state
            .bindings
            .get("491234@s.whatsapp.net")
            .await
            .is_some());
        assert!(fixture
            .state
            .whitelist_snapshot()
            .await
            .contains(&"491234@s.whatsapp.net".to_string()));
        assert!(fixture.api.sent().is_empty());
    }

    #[tokio::test]
    async fn test_start_by_unknown_name_reports_failure() {
        let fixture = make_fixture();

        fixture.dispatcher.dispatch(command("start Alice")).await;

        assert_eq!(fixture.api.sent(), vec!["Couldn't find `alice`.".to_string()]);
    }

    #[tokio::test]
    async fn test_list_filters_contacts() {
        let fixture = make_fixture();
        fixture
            .state
            .update_contacts(vec![
                Contact {
                    jid: "1@s.whatsapp.net".to_string(),
                    name: "Alice".to_string(),
                },
                Contact {
                    jid: "2@s.whatsapp.net".to_string(),
                    name: "Bob".to_string(),
                },
            ])
            .await;

        fixture.dispatcher.dispatch(command("list ali")).await;
        fixture.dispatcher.dispatch(command("list zzz")).await;

        assert_eq!(
            fixture.api.sent(),
            vec![
                "```Alice```".to_string(),
                "No results were found.".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_whitelist_round_trip_via_channel_mention() {
        let fixture = make_fixture();
        let binding = fixture
            .mapper
            .resolve_destination("123@s.whatsapp.net", None)
            .await
            .unwrap();

        fixture
            .dispatcher
            .dispatch(command(&format!("addtowhitelist <#{}>", binding.channel)))
            .await;
        assert!(fixture.state.whitelist_is_active().await);

        fixture
            .dispatcher
            .dispatch(command(&format!(
                "removefromwhitelist <#{}>",
                binding.channel
            )))
            .await;
        assert!(!fixture.state.whitelist_is_active().await);

        assert_eq!(
            fixture.api.sent(),
            vec![
                "Added to the whitelist!".to_string(),
                "Removed from the whitelist!".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_whitelist_commands_validate_the_mention() {
        let fixture = make_fixture();

        fixture
            .dispatcher
            .dispatch(command("addtowhitelist general"))
            .await;

        assert_eq!(
            fixture.api.sent(),
            vec![
                "Please enter a valid channel name. Usage: `addToWhitelist #<target channel>`."
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_whitelist_mention_without_binding_reports_failure() {
        let fixture = make_fixture();

        fixture
            .dispatcher
            .dispatch(command("addtowhitelist <#777>"))
            .await;

        assert_eq!(
            fixture.api.sent(),
            vec!["Couldn't find a chat with the given channel.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_toggles_flip_settings() {
        let fixture = make_fixture();

        fixture.dispatcher.dispatch(command("enableDCPrefix")).await;
        fixture.dispatcher.dispatch(command("disableWAUpload")).await;

        let settings = fixture.state.settings.read().await.clone();
        assert!(settings.discord_prefix);
        assert!(!settings.upload_attachments);
        assert_eq!(
            fixture.api.sent(),
            vec![
                "Discord username prefix enabled!".to_string(),
                "Disabled uploading files to WhatsApp!".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_list_whitelist_names_entries() {
        let fixture = make_fixture();

        fixture.dispatcher.dispatch(command("listwhitelist")).await;

        fixture
            .state
            .update_contacts(vec![Contact {
                jid: "123@s.whatsapp.net".to_string(),
                name: "Alice".to_string(),
            }])
            .await;
        fixture.state.add_to_whitelist("123@s.whatsapp.net").await;
        fixture.dispatcher.dispatch(command("listwhitelist")).await;

        assert_eq!(
            fixture.api.sent(),
            vec![
                "Whitelist is empty/inactive.".to_string(),
                "```Alice```".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_resync_calls_the_session() {
        let fixture = make_fixture();

        fixture.dispatcher.dispatch(command("resync")).await;

        assert_eq!(*fixture.session.resyncs.lock().unwrap(), 1);
        assert_eq!(fixture.api.sent(), vec!["Re-synced!".to_string()]);
    }

    #[tokio::test]
    async fn test_resync_without_session_stays_silent() {
        let fixture = make_fixture();
        let (_tx, rx) = watch::channel::<Option<Arc<dyn WaSession>>>(None);
        let dispatcher = CommandDispatcher::new(
            fixture.state.clone(),
            fixture.mapper.clone(),
            SessionHandle { rx },
            fixture.api.clone(),
        );

        dispatcher.dispatch(command("resync")).await;

        assert!(fixture.api.sent().is_empty());
    }
}
