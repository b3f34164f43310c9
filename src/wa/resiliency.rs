//! Connection lifecycle for the WhatsApp session.
//!
//! A supervisor task owns the sidecar link. Lost connections walk a
//! retry ladder: three immediate reconnects, two delayed ones, then the
//! stored session is abandoned and a fresh pairing starts. The live
//! session is published through a `watch` channel; while none is open,
//! senders observe `None` and fail fast.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::bridge::state::BridgeState;
use crate::common::error::{RelayError, RelayResult};
use crate::common::messages::{WaMessageEvent, WaReactionEvent};
use crate::discord::client::ChannelApi;
use crate::wa::session::WaSession;
use crate::wa::transport::{LinkEvent, SidecarLink};

/// Reconnect attempts made without waiting.
const IMMEDIATE_RETRIES: u32 = 3;
/// Attempts before the stored session is abandoned.
const MAX_RETRIES: u32 = 5;
/// Delay step for attempts past the immediate ones.
const WAIT_STEP_SECS: u64 = 10;

pub const OPEN_NOTICE: &str = "WhatsApp connection successfully opened!";
pub const GIVE_UP_NOTICE: &str = "Failed connecting 5 times. Please rescan the QR code.";

/// Session lifecycle as tracked by the retry ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Open,
    ClosedRetrying(u32),
    Failed,
}

/// What to do about a lost connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        attempt: u32,
        delay: Duration,
        notice: String,
    },
    GiveUp {
        notice: &'static str,
    },
}

/// Counts consecutive failed connection attempts and decides the
/// reconnect schedule. The count resets only when a connection reaches
/// Open, or when the ladder gives up and a fresh pairing starts over.
#[derive(Debug)]
pub struct RetryLadder {
    attempts: u32,
    status: SessionStatus,
}

impl RetryLadder {
    pub fn new() -> Self {
        Self {
            attempts: 0,
            status: SessionStatus::Connecting,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn on_open(&mut self) {
        self.attempts = 0;
        self.status = SessionStatus::Open;
    }

    /// Register a lost connection and decide the next step.
    pub fn on_close(&mut self) -> RetryDecision {
        self.attempts += 1;
        if self.attempts > MAX_RETRIES {
            self.attempts = 0;
            self.status = SessionStatus::Failed;
            return RetryDecision::GiveUp {
                notice: GIVE_UP_NOTICE,
            };
        }

        let attempt = self.attempts;
        self.status = SessionStatus::ClosedRetrying(attempt);
        if attempt <= IMMEDIATE_RETRIES {
            RetryDecision::Retry {
                attempt,
                delay: Duration::ZERO,
                notice: format!("WhatsApp connection failed! Trying to reconnect! Retry #{attempt}"),
            }
        } else {
            let wait = u64::from(attempt - IMMEDIATE_RETRIES) * WAIT_STEP_SECS;
            RetryDecision::Retry {
                attempt,
                delay: Duration::from_secs(wait),
                notice: format!(
                    "WhatsApp connection failed! Waiting {wait} seconds before trying to reconnect! Retry #{attempt}."
                ),
            }
        }
    }
}

impl Default for RetryLadder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable view of the currently open session.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) rx: watch::Receiver<Option<Arc<dyn WaSession>>>,
}

impl SessionHandle {
    /// The open session, or `SessionNotReady` while the supervisor is
    /// between connections.
    pub fn current(&self) -> RelayResult<Arc<dyn WaSession>> {
        self.rx.borrow().clone().ok_or(RelayError::SessionNotReady)
    }
}

/// WhatsApp events handed to the relay orchestrator.
#[derive(Debug)]
pub enum WaRelayEvent {
    Message(WaMessageEvent),
    Reaction(WaReactionEvent),
}

/// Owns the sidecar connection and its retry policy.
pub struct SessionSupervisor {
    state: Arc<BridgeState>,
    api: Arc<dyn ChannelApi>,
    sidecar_url: String,
    session_tx: watch::Sender<Option<Arc<dyn WaSession>>>,
    relay_tx: mpsc::UnboundedSender<WaRelayEvent>,
}

impl SessionSupervisor {
    pub fn new(
        state: Arc<BridgeState>,
        api: Arc<dyn ChannelApi>,
        sidecar_url: String,
        relay_tx: mpsc::UnboundedSender<WaRelayEvent>,
    ) -> (Self, SessionHandle) {
        let (session_tx, session_rx) = watch::channel(None);
        (
            Self {
                state,
                api,
                sidecar_url,
                session_tx,
                relay_tx,
            },
            SessionHandle { rx: session_rx },
        )
    }

    /// Run until the shutdown flag flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ladder = RetryLadder::new();
        let mut fresh = false;

        loop {
            if *shutdown.borrow() {
                return;
            }

            match SidecarLink::connect(&self.sidecar_url, fresh).await {
                Ok((link, events)) => {
                    fresh = false;
                    self.drive_link(Arc::new(link), events, &mut ladder, &mut shutdown)
                        .await;
                    self.session_tx.send_replace(None);
                    if *shutdown.borrow() {
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "Sidecar connection failed"),
            }

            match ladder.on_close() {
                RetryDecision::Retry {
                    attempt,
                    delay,
                    notice,
                } => {
                    warn!(attempt, "WhatsApp connection lost");
                    self.notify(&notice).await;
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                }
                RetryDecision::GiveUp { notice } => {
                    warn!("Abandoning the stored WhatsApp session, starting a fresh pairing");
                    self.notify(notice).await;
                    fresh = true;
                }
            }
        }
    }

    /// Consume events from one link until it closes or shutdown flips.
    async fn drive_link(
        &self,
        session: Arc<SidecarLink>,
        mut events: mpsc::UnboundedReceiver<LinkEvent>,
        ladder: &mut RetryLadder,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(LinkEvent::Open) => {
                        ladder.on_open();
                        self.session_tx
                            .send_replace(Some(session.clone() as Arc<dyn WaSession>));
                        info!("WhatsApp session open");
                        self.notify(OPEN_NOTICE).await;
                    }
                    Some(LinkEvent::Qr(qr)) => {
                        info!("Pairing QR received");
                        self.notify(&format!(
                            "Scan the QR code to link WhatsApp:\n```\n{qr}\n```"
                        ))
                        .await;
                    }
                    Some(LinkEvent::Message(event)) => {
                        let _ = self.relay_tx.send(WaRelayEvent::Message(event));
                    }
                    Some(LinkEvent::Reaction(event)) => {
                        let _ = self.relay_tx.send(WaRelayEvent::Reaction(event));
                    }
                    Some(LinkEvent::Contacts(entries)) => {
                        let count = entries.len();
                        self.state.update_contacts(entries).await;
                        info!(count, "Contact sync merged");
                    }
                    Some(LinkEvent::Closed) | None => return,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Operator notices go to the control channel; failures there only
    /// get logged.
    async fn notify(&self, text: &str) {
        let channel = self.state.control_channel().await;
        if let Err(e) = self.api.channel_send(channel, text).await {
            warn!(error = %e, "Control-channel notice failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_three_retries_are_immediate() {
        let mut ladder = RetryLadder::new();

        for attempt in 1..=3 {
            match ladder.on_close() {
                RetryDecision::Retry {
                    attempt: n,
                    delay,
                    notice,
                } => {
                    assert_eq!(n, attempt);
                    assert_eq!(delay, Duration::ZERO);
                    assert_eq!(
                        notice,
                        format!("WhatsApp connection failed! Trying to reconnect! Retry #{attempt}")
                    );
                }
                other => panic!("expected a retry, got {other:?}"),
            }
        }
        assert_eq!(ladder.status(), SessionStatus::ClosedRetrying(3));
    }

    #[test]
    fn test_later_retries_wait_in_ten_second_steps() {
        let mut ladder = RetryLadder::new();
        for _ in 0..3 {
            ladder.on_close();
        }

        match ladder.on_close() {
            RetryDecision::Retry { delay, notice, .. } => {
                assert_eq!(delay, Duration::from_secs(10));
                assert_eq!(
                    notice,
                    "WhatsApp connection failed! Waiting 10 seconds before trying to reconnect! Retry #4."
                );
            }
            other => panic!("expected a retry, got {other:?}"),
        }
        match ladder.on_close() {
            RetryDecision::Retry { delay, notice, .. } => {
                assert_eq!(delay, Duration::from_secs(20));
                assert_eq!(
                    notice,
                    "WhatsApp connection failed! Waiting 20 seconds before trying to reconnect! Retry #5."
                );
            }
            other => panic!("expected a retry, got {other:?}"),
        }
    }

    #[test]
    fn test_sixth_close_gives_up_and_restarts_the_count() {
        let mut ladder = RetryLadder::new();
        for _ in 0..5 {
            ladder.on_close();
        }

        assert_eq!(
            ladder.on_close(),
            RetryDecision::GiveUp {
                notice: GIVE_UP_NOTICE
            }
        );
        assert_eq!(ladder.status(), SessionStatus::Failed);

        // The fresh pairing starts over at attempt 1.
        match ladder.on_close() {
            RetryDecision::Retry { attempt, delay, .. } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::ZERO);
            }
            other => panic!("expected a retry, got {other:?}"),
        }
    }

    #[test]
    fn test_open_resets_the_count() {
        let mut ladder = RetryLadder::new();
        for _ in 0..4 {
            ladder.on_close();
        }

        ladder.on_open();
        assert_eq!(ladder.status(), SessionStatus::Open);

        match ladder.on_close() {
            RetryDecision::Retry { attempt, .. } => assert_eq!(attempt, 1),
            other => panic!("expected a retry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_fails_fast_without_a_session() {
        let (_tx, rx) = watch::channel::<Option<Arc<dyn WaSession>>>(None);
        let handle = SessionHandle { rx };

        assert!(matches!(
            handle.current(),
            Err(RelayError::SessionNotReady)
        ));
    }
}
