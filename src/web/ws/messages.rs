//! WebSocket message types for the room relay.
//!
//! Both directions derive `Serialize` and `Deserialize` so the client
//! library speaks the same types as the server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatMessage, Identity, MemberSnapshot, RoomEvent, RoomId};
use crate::RoomcastError;

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room, leaving any other room first.
    Join {
        /// Correlates the acknowledgment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Room to join.
        #[serde(default)]
        room_id: String,
        /// Identity to show to other members.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity: Option<Identity>,
    },
    /// Leave the current room.
    Leave,
    /// Send a chat message.
    Message {
        /// Correlates the acknowledgment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Target room.
        #[serde(default)]
        room_id: String,
        /// Message text or media URI.
        #[serde(default)]
        text: String,
        /// Opaque token echoed back in the relayed message.
        #[serde(default)]
        client_correlation_id: Value,
    },
    /// Typing start or stop.
    Typing {
        /// Target room.
        #[serde(default)]
        room_id: String,
        /// Whether the sender is typing.
        #[serde(default)]
        typing: bool,
        /// Identity to show; defaults to the joined identity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity: Option<Identity>,
    },
    /// Ask for the shareable invite code of a room.
    InviteCode {
        /// Correlates the acknowledgment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Room to share.
        #[serde(default)]
        room_id: String,
    },
    /// Heartbeat ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Outcome of a request that carried a `request_id`.
    Ack(Ack),
    /// A relayed chat message.
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
    /// Full member list after a membership change.
    PresenceUpdate(MemberSnapshot),
    /// Protocol error.
    Error {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// Heartbeat pong response.
    Pong,
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(code: &str, message: &str) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<RoomEvent> for ServerMessage {
    fn from(event: RoomEvent) -> Self {
        match event {
            RoomEvent::Presence(snapshot) => ServerMessage::PresenceUpdate(snapshot),
            RoomEvent::Message(message) => ServerMessage::Message(message),
            RoomEvent::Typing {
                room_id,
                typing,
                identity,
            } => ServerMessage::Typing {
                room_id,
                typing,
                identity,
            },
        }
    }
}

/// Acknowledgment payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Request this acknowledges.
    pub request_id: u64,
    /// Whether the request succeeded.
    pub ok: bool,
    /// Human-readable failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Invite code for `invite_code` requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Sequence assigned to a relayed message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_sequence: Option<u64>,
    /// Milliseconds until a rate-limited request may be retried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl Ack {
    /// A successful acknowledgment.
    pub fn ok(request_id: u64) -> Self {
        Self {
            request_id,
            ok: true,
            error: None,
            reason: None,
            code: None,
            server_sequence: None,
            retry_after_ms: None,
        }
    }

    /// A failed acknowledgment carrying the error and its reason.
    pub fn failed(request_id: u64, error: &RoomcastError) -> Self {
        Self {
            request_id,
            ok: false,
            error: Some(error.to_string()),
            reason: Some(error.reason().to_string()),
            code: None,
            server_sequence: None,
            retry_after_ms: match error {
                RoomcastError::RateLimited { retry_after } => {
                    Some(u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX))
                }
                _ => None,
            },
        }
    }

    /// Attach a message sequence number.
    pub fn with_sequence(mut self, server_sequence: Option<u64>) -> Self {
        self.server_sequence = server_sequence;
        self
    }

    /// Attach an invite code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}
