//! Chat WebSocket handler.
//!
//! One task per connection. The task owns the connection's [`Session`] and
//! multiplexes frames from the socket with room events from the session's
//! outbox.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::chat::{MessageRelay, RoomId, RoomRegistry, Session, SessionManager, TypingRelay};
use crate::rate_limit::{RateLimitResult, RateLimiters};
use crate::RoomcastError;

use super::messages::{Ack, ClientMessage, ServerMessage};

/// State for WebSocket chat handler.
#[derive(Clone)]
pub struct ChatWsState {
    /// Session lifecycle.
    pub sessions: SessionManager,
    /// Message relay.
    pub relay: MessageRelay,
    /// Typing relay.
    pub typing: TypingRelay,
    /// Per-connection rate limiters.
    pub limiters: Arc<RateLimiters>,
}

impl ChatWsState {
    /// Create a new chat WebSocket state over a registry.
    pub fn new(registry: Arc<RoomRegistry>, limiters: Arc<RateLimiters>) -> Self {
        Self {
            sessions: SessionManager::new(Arc::clone(&registry)),
            relay: MessageRelay::new(Arc::clone(&registry)),
            typing: TypingRelay::new(registry),
            limiters,
        }
    }
}

/// WebSocket chat handler.
///
/// GET /ws
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ChatWsState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<ChatWsState>) {
    let (outbox, mut events) = mpsc::unbounded_channel();
    let mut session = state.sessions.on_connect(outbox);
    let connection_id = session.connection_id();

    tracing::info!(connection = %connection_id, "WebSocket connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                let Some(frame) = frame else {
                    break;
                };
                match frame {
                    Ok(Message::Text(text)) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handle_client_message(&state, &mut session, client_msg).await
                            }
                            Err(e) => {
                                tracing::debug!(connection = %connection_id, "Failed to parse client message: {}", e);
                                Some(ServerMessage::error("invalid_message", "Invalid message format"))
                            }
                        };
                        if let Some(reply) = reply {
                            if send_json(&mut ws_sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::debug!(connection = %connection_id, "WebSocket closed by client");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(connection = %connection_id, "WebSocket error: {}", e);
                        break;
                    }
                }
            }

            Some(event) = events.recv() => {
                if send_json(&mut ws_sender, &ServerMessage::from(event)).await.is_err() {
                    break;
                }
            }
        }
    }

    state.limiters.forget(&connection_id);
    state.sessions.on_disconnect(session).await;
    tracing::info!(connection = %connection_id, "WebSocket disconnected");
}

/// Serialize and send one server message.
async fn send_json(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => ws_sender.send(Message::Text(json)).await,
        Err(e) => {
            tracing::warn!("Failed to encode server message: {}", e);
            Ok(())
        }
    }
}

/// Handle a client message. Returns the direct reply, if any.
async fn handle_client_message(
    state: &ChatWsState,
    session: &mut Session,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Join {
            request_id,
            room_id,
            identity,
        } => {
            let identity = identity.unwrap_or_default();
            let ack = match state.sessions.join(session, &room_id, identity).await {
                Ok(snapshot) => {
                    tracing::info!(
                        connection = %session.connection_id(),
                        room = %snapshot.room_id,
                        members = snapshot.len(),
                        "Joined room"
                    );
                    request_id.map(Ack::ok)
                }
                Err(e) => {
                    tracing::debug!(connection = %session.connection_id(), "Join rejected: {}", e);
                    request_id.map(|id| Ack::failed(id, &e))
                }
            };
            ack.map(ServerMessage::Ack)
        }

        ClientMessage::Leave => {
            if let Some(snapshot) = state.sessions.leave(session).await {
                tracing::info!(
                    connection = %session.connection_id(),
                    room = %snapshot.room_id,
                    "Left room"
                );
            }
            None
        }

        ClientMessage::Message {
            request_id,
            room_id,
            text,
            client_correlation_id,
        } => {
            let result = match state.limiters.message.check_and_record(&session.connection_id()) {
                RateLimitResult::Allowed => {
                    state
                        .relay
                        .send(session, &room_id, text, client_correlation_id)
                        .await
                }
                RateLimitResult::Denied { retry_after } => {
                    tracing::warn!(connection = %session.connection_id(), "Message rate limited");
                    Err(RoomcastError::RateLimited { retry_after })
                }
            };
            let ack = request_id.map(|id| match &result {
                Ok(relayed) => Ack::ok(id).with_sequence(relayed.server_sequence),
                Err(e) => Ack::failed(id, e),
            });
            ack.map(ServerMessage::Ack)
        }

        ClientMessage::Typing {
            room_id,
            typing,
            identity,
        } => {
            // Stops are never throttled
            if !typing
                || state
                    .limiters
                    .typing
                    .check_and_record(&session.connection_id())
                    .is_allowed()
            {
                state.typing.forward(session, &room_id, typing, identity).await;
            } else {
                tracing::trace!(connection = %session.connection_id(), "Typing signal rate limited");
            }
            None
        }

        ClientMessage::InviteCode {
            request_id,
            room_id,
        } => request_id
            .map(|id| match RoomId::parse(&room_id) {
                Ok(room_id) => Ack::ok(id).with_code(room_id.as_str()),
                Err(e) => Ack::failed(id, &e),
            })
            .map(ServerMessage::Ack),

        ClientMessage::Ping => Some(ServerMessage::Pong),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Identity, RoomEvent};
    use crate::rate_limit::RateLimitConfig;
    use serde_json::Value;

    fn state_with(limiters: RateLimiters) -> (Arc<RoomRegistry>, ChatWsState) {
        let registry = Arc::new(RoomRegistry::new());
        let state = ChatWsState::new(Arc::clone(&registry), Arc::new(limiters));
        (registry, state)
    }

    fn join_msg(request_id: u64, room_id: &str, name: &str) -> ClientMessage {
        ClientMessage::Join {
            request_id: Some(request_id),
            room_id: room_id.to_string(),
            identity: Some(Identity::new(name, "")),
        }
    }

    fn message_msg(request_id: Option<u64>, room_id: &str, text: &str) -> ClientMessage {
        ClientMessage::Message {
            request_id,
            room_id: room_id.to_string(),
            text: text.to_string(),
            client_correlation_id: Value::Null,
        }
    }

    fn expect_ack(reply: Option<ServerMessage>) -> Ack {
        match reply {
            Some(ServerMessage::Ack(ack)) => ack,
            other => panic!("Expected Ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_acks_ok() {
        let (registry, state) = state_with(RateLimiters::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = state.sessions.on_connect(tx);

        let ack = expect_ack(handle_client_message(&state, &mut session, join_msg(1, "abc123", "Alice")).await);
        assert!(ack.ok);
        assert_eq!(ack.request_id, 1);
        assert_eq!(registry.member_count(&RoomId::parse("ABC123").unwrap()).await, 1);
    }

    #[tokio::test]
    async fn test_join_blank_room_acks_error() {
        let (_registry, state) = state_with(RateLimiters::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = state.sessions.on_connect(tx);

        let ack = expect_ack(handle_client_message(&state, &mut session, join_msg(2, " ", "Alice")).await);
        assert!(!ack.ok);
        assert_eq!(ack.error.as_deref(), Some("roomId required"));
        assert_eq!(ack.reason.as_deref(), Some("invalid_room"));
    }

    #[tokio::test]
    async fn test_request_without_id_gets_no_ack() {
        let (_registry, state) = state_with(RateLimiters::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = state.sessions.on_connect(tx);
        handle_client_message(&state, &mut session, join_msg(1, "R1", "A")).await;

        let reply = handle_client_message(&state, &mut session, message_msg(None, "R1", "hi")).await;
        assert!(reply.is_none());

        let mut relayed = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RoomEvent::Message(_)) {
                relayed += 1;
            }
        }
        assert_eq!(relayed, 1);
    }

    #[tokio::test]
    async fn test_message_ack_carries_sequence() {
        let (_registry, state) = state_with(RateLimiters::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = state.sessions.on_connect(tx);
        handle_client_message(&state, &mut session, join_msg(1, "R1", "A")).await;

        let first = expect_ack(handle_client_message(&state, &mut session, message_msg(Some(2), "R1", "a")).await);
        let second = expect_ack(handle_client_message(&state, &mut session, message_msg(Some(3), "R1", "b")).await);
        assert_eq!(first.server_sequence, Some(1));
        assert_eq!(second.server_sequence, Some(2));
    }

    #[tokio::test]
    async fn test_message_rate_limited() {
        let limiters =
            RateLimiters::with_config(RateLimitConfig::new(1, 60), RateLimitConfig::new(1, 60));
        let (_registry, state) = state_with(limiters);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = state.sessions.on_connect(tx);
        handle_client_message(&state, &mut session, join_msg(1, "R1", "A")).await;

        let ok = expect_ack(handle_client_message(&state, &mut session, message_msg(Some(2), "R1", "a")).await);
        assert!(ok.ok);
        let limited = expect_ack(handle_client_message(&state, &mut session, message_msg(Some(3), "R1", "b")).await);
        assert!(!limited.ok);
        assert_eq!(limited.reason.as_deref(), Some("rate_limited"));
        assert_eq!(limited.server_sequence, None);
    }

    #[tokio::test]
    async fn test_typing_stop_passes_exhausted_limiter() {
        let limiters =
            RateLimiters::with_config(RateLimitConfig::new(20, 60), RateLimitConfig::new(1, 60));
        let (_registry, state) = state_with(limiters);
        let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let mut alice = state.sessions.on_connect(alice_tx);
        let mut bob = state.sessions.on_connect(bob_tx);
        handle_client_message(&state, &mut alice, join_msg(1, "R1", "Alice")).await;
        handle_client_message(&state, &mut bob, join_msg(1, "R1", "Bob")).await;

        for typing in [true, true, true, false] {
            let msg = ClientMessage::Typing {
                room_id: "R1".to_string(),
                typing,
                identity: None,
            };
            handle_client_message(&state, &mut alice, msg).await;
        }

        let mut seen = Vec::new();
        while let Ok(event) = bob_rx.try_recv() {
            if let RoomEvent::Typing { typing, .. } = event {
                seen.push(typing);
            }
        }
        assert_eq!(seen, vec![true, false]);
    }

    #[tokio::test]
    async fn test_invite_code_normalizes() {
        let (_registry, state) = state_with(RateLimiters::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = state.sessions.on_connect(tx);

        let msg = ClientMessage::InviteCode {
            request_id: Some(5),
            room_id: " k3x9qa ".to_string(),
        };
        let ack = expect_ack(handle_client_message(&state, &mut session, msg).await);
        assert!(ack.ok);
        assert_eq!(ack.code.as_deref(), Some("K3X9QA"));

        let msg = ClientMessage::InviteCode {
            request_id: Some(6),
            room_id: String::new(),
        };
        let ack = expect_ack(handle_client_message(&state, &mut session, msg).await);
        assert!(!ack.ok);
        assert_eq!(ack.code, None);
    }

    #[tokio::test]
    async fn test_typing_and_leave_have_no_reply() {
        let (registry, state) = state_with(RateLimiters::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = state.sessions.on_connect(tx);
        handle_client_message(&state, &mut session, join_msg(1, "R1", "A")).await;

        let typing = ClientMessage::Typing {
            room_id: "R1".to_string(),
            typing: true,
            identity: None,
        };
        assert!(handle_client_message(&state, &mut session, typing).await.is_none());
        assert!(handle_client_message(&state, &mut session, ClientMessage::Leave).await.is_none());
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_ping_replies_pong() {
        let (_registry, state) = state_with(RateLimiters::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = state.sessions.on_connect(tx);
        assert_eq!(
            handle_client_message(&state, &mut session, ClientMessage::Ping).await,
            Some(ServerMessage::Pong)
        );
    }
}
