//! WebSocket transport to the Baileys sidecar.
//!
//! One `SidecarLink` wraps one socket. Requests go out as JSON text
//! frames and are correlated with replies by id; push frames surface on
//! an unbounded event channel. When the socket dies the event stream
//! ends with `LinkEvent::Closed` and every pending request fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serenity::async_trait;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::common::error::{SessionError, SessionResult};
use crate::common::messages::{Contact, WaMessageEvent, WaReactionEvent};
use crate::wa::session::{ReactionKey, WaSession};
use crate::wa::types::{
    MediaPayload, PicturePayload, ReplyFrame, RequestFrame, RequestOp, SendAck, SidecarFrame,
    WireLinkStatus,
};

/// How long a request may wait for its reply.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Push events surfaced by a live link.
#[derive(Debug)]
pub enum LinkEvent {
    /// The WhatsApp session behind the sidecar reached Open.
    Open,
    /// A pairing QR the operator has to scan.
    Qr(String),
    Message(WaMessageEvent),
    Reaction(WaReactionEvent),
    Contacts(Vec<Contact>),
    /// The session or the socket closed. Always the last event.
    Closed,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<ReplyFrame>>>>;

/// A connected sidecar socket. Cheap to share; all methods take `&self`.
#[derive(Debug)]
pub struct SidecarLink {
    write_tx: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl SidecarLink {
    /// Connect and send the init frame. `fresh` asks the sidecar to
    /// drop its stored credentials and start a new pairing.
    pub async fn connect(
        url: &str,
        fresh: bool,
    ) -> SessionResult<(Self, mpsc::UnboundedReceiver<LinkEvent>)> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::ConnectFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let (sink, reader) = stream.split();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel::<String>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(write_loop(sink, write_rx));
        tokio::spawn(read_loop(reader, pending.clone(), event_tx));

        let link = Self {
            write_tx,
            pending,
            // Id 0 is reserved for the init frame below.
            next_id: AtomicU64::new(1),
        };
        link.send_frame(RequestFrame {
            id: 0,
            op: RequestOp::Init { fresh },
        })?;
        Ok((link, event_rx))
    }

    fn send_frame(&self, frame: RequestFrame) -> SessionResult<()> {
        let text = serde_json::to_string(&frame).map_err(|e| SessionError::InvalidPayload {
            message: e.to_string(),
        })?;
        self.write_tx
            .send(text)
            .map_err(|_| SessionError::ConnectionClosed)
    }

    /// Send a request and wait for its reply. Maps sidecar-side
    /// rejections to `SendRejected`.
    async fn request(&self, op: RequestOp) -> SessionResult<Option<serde_json::Value>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.send_frame(RequestFrame { id, op }) {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let reply = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(SessionError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(SessionError::Timeout);
            }
        };

        if reply.ok {
            Ok(reply.payload)
        } else {
            Err(SessionError::SendRejected {
                message: reply
                    .error
                    .unwrap_or_else(|| "sidecar rejected the request".to_string()),
            })
        }
    }
}

fn parse_payload<T: DeserializeOwned>(payload: Option<serde_json::Value>) -> SessionResult<T> {
    let value = payload.ok_or_else(|| SessionError::InvalidPayload {
        message: "reply carried no payload".to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| SessionError::InvalidPayload {
        message: e.to_string(),
    })
}

#[async_trait]
impl WaSession for SidecarLink {
    async fn send_text(
        &self,
        jid: &str,
        text: &str,
        quoted_id: Option<&str>,
    ) -> SessionResult<String> {
        let payload = self
            .request(RequestOp::SendText {
                jid: jid.to_string(),
                text: text.to_string(),
                quoted_id: quoted_id.map(str::to_string),
            })
            .await?;
        Ok(parse_payload::<SendAck>(payload)?.message_id)
    }

    async fn send_document(
        &self,
        jid: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> SessionResult<String> {
        let payload = self
            .request(RequestOp::SendDocument {
                jid: jid.to_string(),
                file_name: file_name.to_string(),
                data: BASE64.encode(&data),
            })
            .await?;
        Ok(parse_payload::<SendAck>(payload)?.message_id)
    }

    async fn send_reaction(&self, key: &ReactionKey, emoji: &str) -> SessionResult<String> {
        let payload = self
            .request(RequestOp::SendReaction {
                key: key.into(),
                emoji: emoji.to_string(),
            })
            .await?;
        Ok(parse_payload::<SendAck>(payload)?.message_id)
    }

    async fn download_media(&self, chat_jid: &str, message_id: &str) -> SessionResult<Vec<u8>> {
        let payload = self
            .request(RequestOp::DownloadMedia {
                jid: chat_jid.to_string(),
                message_id: message_id.to_string(),
            })
            .await?;
        let media: MediaPayload = parse_payload(payload)?;
        BASE64
            .decode(media.data.as_bytes())
            .map_err(|e| SessionError::InvalidPayload {
                message: e.to_string(),
            })
    }

    async fn profile_picture(&self, jid: &str) -> SessionResult<Option<String>> {
        let payload = self
            .request(RequestOp::ProfilePicture {
                jid: jid.to_string(),
            })
            .await?;
        Ok(parse_payload::<PicturePayload>(payload)?.url)
    }

    async fn resync(&self) -> SessionResult<()> {
        self.request(RequestOp::Resync).await?;
        Ok(())
    }
}

async fn write_loop(mut sink: WsSink, mut write_rx: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = write_rx.recv().await {
        if let Err(e) = sink.send(Message::Text(text)).await {
            warn!(error = %e, "Sidecar write failed");
            return;
        }
    }
    // Link dropped; close the socket politely.
    let _ = sink.send(Message::Close(None)).await;
}

async fn read_loop(
    mut reader: WsReader,
    pending: PendingMap,
    event_tx: mpsc::UnboundedSender<LinkEvent>,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<SidecarFrame>(&text) {
                Ok(frame) => {
                    if !dispatch(frame, &pending, &event_tx).await {
                        break;
                    }
                }
                Err(e) => debug!(error = %e, "Discarding unparseable sidecar frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Sidecar read failed");
                break;
            }
        }
    }
    // Fail every in-flight request by dropping its reply sender.
    pending.lock().await.clear();
    let _ = event_tx.send(LinkEvent::Closed);
}

/// Route one frame. Returns false when the link is finished.
async fn dispatch(
    frame: SidecarFrame,
    pending: &PendingMap,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> bool {
    match frame {
        SidecarFrame::Reply(reply) => {
            match pending.lock().await.remove(&reply.id) {
                Some(tx) => {
                    let _ = tx.send(reply);
                }
                None => debug!(id = reply.id, "Reply without a pending request"),
            }
            true
        }
        SidecarFrame::Message(message) => events.send(LinkEvent::Message(message.into())).is_ok(),
        SidecarFrame::Reaction(reaction) => {
            events.send(LinkEvent::Reaction(reaction.into())).is_ok()
        }
        SidecarFrame::Contacts(sync) => events
            .send(LinkEvent::Contacts(
                sync.contacts.into_iter().map(Into::into).collect(),
            ))
            .is_ok(),
        SidecarFrame::Connection(update) => {
            if let Some(qr) = update.qr {
                if events.send(LinkEvent::Qr(qr)).is_err() {
                    return false;
                }
            }
            match update.status {
                Some(WireLinkStatus::Open) => events.send(LinkEvent::Open).is_ok(),
                // A closed session ends the link; the supervisor
                // reconnects with a new socket.
                Some(WireLinkStatus::Close) => false,
                None => true,
            }
        }
    }
}
