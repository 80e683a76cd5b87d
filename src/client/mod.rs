//! WebSocket client for the room relay.
//!
//! [`RoomClient`] speaks the relay protocol: requests that expect an
//! acknowledgment are matched to it by request id and fail with a transport
//! error if none arrives in time. Everything the relay pushes unprompted is
//! surfaced as a [`ClientEvent`].

mod store;
mod view;

pub use store::{LocalStore, RoomHistoryEntry, RoomOrigin, HISTORY_LIMIT};
pub use view::{ChatView, MessageBody};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::chat::typing::{TypingEmitter, DEFAULT_LEASE, DEFAULT_QUIET_PERIOD};
use crate::chat::{ChatMessage, Identity, MemberSnapshot, RoomId};
use crate::config::Config;
use crate::web::ws::{Ack, ClientMessage, ServerMessage};
use crate::{Result, RoomcastError};

/// Default time to wait for an acknowledgment.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Client tuning.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Time to wait for an acknowledgment.
    pub ack_timeout: Duration,
    /// Quiet period before a typing stop is sent.
    pub quiet_period: Duration,
    /// How long a received typing start stays visible.
    pub lease: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            quiet_period: DEFAULT_QUIET_PERIOD,
            lease: DEFAULT_LEASE,
        }
    }
}

impl From<&Config> for ClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            ack_timeout: Duration::from_millis(config.client.ack_timeout_ms),
            quiet_period: config.typing.quiet_period(),
            lease: config.typing.lease(),
        }
    }
}

/// Events pushed by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A relayed chat message, in relay order.
    Message(ChatMessage),
    /// Another member started or stopped typing.
    Typing {
        /// Room the signal belongs to.
        room_id: RoomId,
        /// Whether the subject is typing.
        typing: bool,
        /// Who is typing.
        identity: Identity,
    },
    /// Member list after a membership change.
    Presence(MemberSnapshot),
    /// The relay reported an error or the connection failed.
    ConnectionError(String),
    /// The connection closed. Always the last event.
    Disconnected,
}

type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<Ack>>>>;

/// Connection to a relay.
pub struct RoomClient {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    pending: PendingAcks,
    next_request_id: AtomicU64,
    current_room: Arc<Mutex<Option<RoomId>>>,
    typing: TypingEmitter,
    config: ClientConfig,
}

impl RoomClient {
    /// Connect to a relay at `url` (for example `ws://127.0.0.1:3000/ws`).
    ///
    /// Returns the client and the receiver of pushed events.
    pub async fn connect(
        url: &str,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        debug!(url, "Connected to relay");

        // Writer task: forward outgoing requests to the socket
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<ClientMessage>();
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to encode request: {}", e);
                        continue;
                    }
                };
                if ws_writer.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        // Reader task: resolve acks and surface pushed events
        let pending: PendingAcks = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::Ack(ack)) => resolve(&reader_pending, ack),
                        Ok(msg) => {
                            if let Some(event) = event_from(msg) {
                                let _ = event_tx.send(event);
                            }
                        }
                        Err(e) => warn!("Unreadable frame from relay: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx.send(ClientEvent::ConnectionError(e.to_string()));
                        break;
                    }
                }
            }

            // Dropping the senders fails every request still waiting
            reader_pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            let _ = event_tx.send(ClientEvent::Disconnected);
            debug!("Relay connection closed");
        });

        // Typing: debounce local activity and send signals for the current room
        let current_room = Arc::new(Mutex::new(None::<RoomId>));
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let typing = TypingEmitter::spawn(config.quiet_period, signal_tx);
        let typing_outgoing = outgoing.clone();
        let typing_room = Arc::clone(&current_room);
        tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                let room_id = typing_room
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                let Some(room_id) = room_id else {
                    continue;
                };
                let msg = ClientMessage::Typing {
                    room_id: room_id.to_string(),
                    typing: signal.is_typing(),
                    identity: None,
                };
                if typing_outgoing.send(msg).is_err() {
                    break;
                }
            }
        });

        let client = Self {
            outgoing,
            pending,
            next_request_id: AtomicU64::new(1),
            current_room,
            typing,
            config,
        };
        Ok((client, event_rx))
    }

    /// Connect to the relay named in the `[client]` section of `config`.
    pub async fn connect_with(
        config: &Config,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
        Self::connect(&config.client.server_url, ClientConfig::from(config)).await
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Room joined last, if any.
    pub fn current_room(&self) -> Option<RoomId> {
        self.current_room
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Join a room, leaving the current one.
    pub async fn join(&self, room_id: &str, identity: Identity) -> Result<RoomId> {
        let room_id = RoomId::parse(room_id)?;
        let ack = self
            .request(|request_id| ClientMessage::Join {
                request_id: Some(request_id),
                room_id: room_id.to_string(),
                identity: Some(identity),
            })
            .await?;
        ack_result(ack)?;

        *self
            .current_room
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(room_id.clone());
        Ok(room_id)
    }

    /// Leave the current room. The relay does not acknowledge leaves.
    pub fn leave(&self) -> Result<()> {
        self.current_room
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.send(ClientMessage::Leave)
    }

    /// Send text to the current room.
    ///
    /// The text is trimmed; blank text is not sent and yields `None`.
    /// Otherwise returns the sequence number the relay assigned.
    pub async fn send_text(&self, text: &str, client_correlation_id: Value) -> Result<Option<u64>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let room_id = self.current_room().ok_or(RoomcastError::InvalidRoom)?;

        let ack = self
            .request(|request_id| ClientMessage::Message {
                request_id: Some(request_id),
                room_id: room_id.to_string(),
                text: text.to_string(),
                client_correlation_id,
            })
            .await?;
        Ok(ack_result(ack)?.server_sequence)
    }

    /// Report local input activity for the typing indicator.
    pub fn typing_activity(&self) -> bool {
        self.typing.activity()
    }

    /// Ask the relay for the shareable code of a room.
    pub async fn invite_code(&self, room_id: &str) -> Result<String> {
        let ack = self
            .request(|request_id| ClientMessage::InviteCode {
                request_id: Some(request_id),
                room_id: room_id.to_string(),
            })
            .await?;
        ack_result(ack)?
            .code
            .ok_or_else(|| RoomcastError::Transport("acknowledgment without code".to_string()))
    }

    /// Close the connection, sending a final typing stop if one is pending.
    pub async fn close(self) {
        let Self {
            outgoing, typing, ..
        } = self;
        typing.close().await;
        drop(outgoing);
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        self.outgoing
            .send(msg)
            .map_err(|_| RoomcastError::Transport("connection closed".to_string()))
    }

    async fn request(&self, build: impl FnOnce(u64) -> ClientMessage) -> Result<Ack> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id, tx);

        if let Err(e) = self.send(build(request_id)) {
            self.forget(request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.ack_timeout, rx).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(_)) => Err(RoomcastError::Transport(
                "connection closed before acknowledgment".to_string(),
            )),
            Err(_) => {
                self.forget(request_id);
                Err(RoomcastError::Transport(format!(
                    "no acknowledgment within {}ms",
                    self.config.ack_timeout.as_millis()
                )))
            }
        }
    }

    fn forget(&self, request_id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&request_id);
    }
}

fn resolve(pending: &PendingAcks, ack: Ack) {
    let waiter = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&ack.request_id);
    match waiter {
        Some(waiter) => {
            let _ = waiter.send(ack);
        }
        None => debug!(request_id = ack.request_id, "Acknowledgment for unknown request"),
    }
}

fn event_from(msg: ServerMessage) -> Option<ClientEvent> {
    match msg {
        ServerMessage::Message(message) => Some(ClientEvent::Message(message)),
        ServerMessage::Typing {
            room_id,
            typing,
            identity,
        } => Some(ClientEvent::Typing {
            room_id,
            typing,
            identity,
        }),
        ServerMessage::PresenceUpdate(snapshot) => Some(ClientEvent::Presence(snapshot)),
        ServerMessage::Error { code, message } => {
            Some(ClientEvent::ConnectionError(format!("{code}: {message}")))
        }
        ServerMessage::Ack(_) | ServerMessage::Pong => None,
    }
}

/// Turn a failed acknowledgment back into an error.
fn ack_result(ack: Ack) -> Result<Ack> {
    if ack.ok {
        return Ok(ack);
    }
    match ack.reason.as_deref() {
        Some("invalid_room") => Err(RoomcastError::InvalidRoom),
        Some("rate_limited") => Err(RoomcastError::RateLimited {
            retry_after: Duration::from_millis(ack.retry_after_ms.unwrap_or(0)),
        }),
        _ => Err(RoomcastError::Transport(
            ack.error.unwrap_or_else(|| "request rejected".to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// A relay that accepts connections and never answers.
    async fn silent_relay() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = RoomClient::connect(&format!("ws://{addr}"), ClientConfig::default()).await;
        assert!(matches!(result, Err(RoomcastError::Transport(_))));
    }

    #[tokio::test]
    async fn test_missing_ack_times_out() {
        let url = silent_relay().await;
        let config = ClientConfig {
            ack_timeout: Duration::from_millis(100),
            ..ClientConfig::default()
        };
        let (client, _events) = RoomClient::connect(&url, config).await.unwrap();

        let result = client.join("ABC123", Identity::default()).await;
        assert!(matches!(result, Err(RoomcastError::Transport(_))));
        assert!(client.current_room().is_none());
        assert!(client.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_with_config() {
        let mut config = Config::default();
        config.client.server_url = silent_relay().await;
        config.client.ack_timeout_ms = 50;

        let (client, _events) = RoomClient::connect_with(&config).await.unwrap();
        assert_eq!(client.config().ack_timeout, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_blank_room_rejected_locally() {
        let url = silent_relay().await;
        let (client, _events) = RoomClient::connect(&url, ClientConfig::default()).await.unwrap();

        let result = client.join("  ", Identity::default()).await;
        assert!(matches!(result, Err(RoomcastError::InvalidRoom)));
    }

    #[tokio::test]
    async fn test_send_without_room() {
        let url = silent_relay().await;
        let (client, _events) = RoomClient::connect(&url, ClientConfig::default()).await.unwrap();

        assert_eq!(client.send_text("   ", Value::Null).await.unwrap(), None);
        assert!(matches!(
            client.send_text("hi", Value::Null).await,
            Err(RoomcastError::InvalidRoom)
        ));
    }

    #[test]
    fn test_ack_result_maps_reasons() {
        assert!(ack_result(Ack::ok(1)).is_ok());
        assert!(matches!(
            ack_result(Ack::failed(1, &RoomcastError::InvalidRoom)),
            Err(RoomcastError::InvalidRoom)
        ));

        let limited = RoomcastError::RateLimited {
            retry_after: Duration::from_millis(250),
        };
        match ack_result(Ack::failed(2, &limited)) {
            Err(RoomcastError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_millis(250));
            }
            other => panic!("Expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_unknown_request_is_ignored() {
        let pending: PendingAcks = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = oneshot::channel();
        pending.lock().unwrap().insert(1, tx);

        resolve(&pending, Ack::ok(2));
        assert!(rx.try_recv().is_err());
        resolve(&pending, Ack::ok(1));
        assert_eq!(rx.try_recv().unwrap().request_id, 1);
        assert!(pending.lock().unwrap().is_empty());
    }

    #[test]
    fn test_client_config_from_config() {
        let mut config = Config::default();
        config.client.ack_timeout_ms = 250;
        let client_config = ClientConfig::from(&config);
        assert_eq!(client_config.ack_timeout, Duration::from_millis(250));
        assert_eq!(client_config.quiet_period, DEFAULT_QUIET_PERIOD);
        assert_eq!(client_config.lease, DEFAULT_LEASE);
    }
}
