//! Ferryman - Discord-WhatsApp chat bridge
//!
//! Relays messages, attachments and reactions between WhatsApp chats
//! and per-chat Discord channels, driven through a sidecar that holds
//! the WhatsApp session.

mod bridge;
mod common;
mod config;
mod discord;
mod wa;

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use bridge::{BridgeState, IdentityMapper, RelayOrchestrator};
use config::{env::get_config_path, load_and_validate};
use discord::client::ChannelApi;
use discord::{CommandDispatcher, DiscordBot};
use wa::SessionSupervisor;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Ferryman v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        error!("See the example configuration for reference.");
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Guild: {}", config.discord.guild_id);
    info!("  Control channel: {}", config.discord.control_channel);
    info!("  Sidecar: {}", config.whatsapp.sidecar_url);

    let state = Arc::new(BridgeState::new(&config));

    // ============================================================
    // Create channels for communication
    // ============================================================

    let (discord_events_tx, discord_events_rx) = mpsc::unbounded_channel();
    let (wa_relay_tx, wa_relay_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ============================================================
    // Connect the Discord side
    // ============================================================

    let (bot, api) = DiscordBot::connect(&config, state.clone(), discord_events_tx).await?;
    let api: Arc<dyn ChannelApi> = api;

    let mapper = Arc::new(IdentityMapper::new(state.clone(), api.clone()));

    let (supervisor, session) = SessionSupervisor::new(
        state.clone(),
        api.clone(),
        config.whatsapp.sidecar_url.clone(),
        wa_relay_tx,
    );

    let commands = CommandDispatcher::new(
        state.clone(),
        mapper.clone(),
        session.clone(),
        api.clone(),
    );
    let orchestrator = RelayOrchestrator::new(state, mapper, session, api, commands);

    // ============================================================
    // Spawn the long-running tasks
    // ============================================================

    let mut discord_task = tokio::spawn(bot.run(shutdown_rx.clone()));
    let mut supervisor_task = tokio::spawn(supervisor.run(shutdown_rx.clone()));
    let mut relay_task = tokio::spawn(orchestrator.run(discord_events_rx, wa_relay_rx, shutdown_rx));

    // ============================================================
    // Run until a task dies or a shutdown signal arrives
    // ============================================================

    tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - initiating graceful shutdown...");
        }
        _ = &mut discord_task => warn!("Discord task ended unexpectedly"),
        _ = &mut supervisor_task => warn!("WhatsApp supervisor ended unexpectedly"),
        _ = &mut relay_task => warn!("Relay task ended unexpectedly"),
    }

    // Flip the shutdown flag and give the remaining tasks a moment to
    // wind down.
    let _ = shutdown_tx.send(true);
    let tasks = [
        ("Discord", discord_task),
        ("WhatsApp supervisor", supervisor_task),
        ("Relay", relay_task),
    ];
    for (name, task) in tasks {
        if task.is_finished() {
            continue;
        }
        match tokio::time::timeout(tokio::time::Duration::from_secs(5), task).await {
            Ok(Ok(())) => info!("{} task stopped", name),
            Ok(Err(e)) => warn!("{} task panicked: {}", name, e),
            Err(_) => warn!("{} task did not stop in time", name),
        }
    }

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
