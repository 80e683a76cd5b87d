//! Message relay.
//!
//! Assigns each chat message its room-scoped sequence number and server
//! timestamp, then fans it out to every member of the room. The sender gets
//! its own copy too: display order is defined by relay order alone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::registry::RoomRegistry;
use super::room::Identity;
use super::room_id::RoomId;
use super::session::Session;
use crate::Result;

/// A relayed chat message. Immutable once relayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Room the message was relayed in.
    pub room_id: RoomId,
    /// Message text. Media travels as a URI in the text.
    pub text: String,
    /// Sender identity at relay time.
    pub sender: Identity,
    /// Opaque token chosen by the sending client.
    #[serde(default)]
    pub client_correlation_id: Value,
    /// Per-room sequence number, starting at 1.
    pub server_sequence: u64,
    /// When the relay accepted the message.
    pub server_ts: DateTime<Utc>,
}

/// Outcome of a successful relay request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAck {
    /// Room the message was sent to.
    pub room_id: RoomId,
    /// Assigned sequence number, or `None` if the room had no members.
    pub server_sequence: Option<u64>,
    /// Number of members the message was delivered to.
    pub recipients: usize,
}

/// Relay for chat messages.
#[derive(Clone)]
pub struct MessageRelay {
    registry: Arc<RoomRegistry>,
}

impl MessageRelay {
    /// Create a relay over a registry.
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Relay a message to every current member of a room.
    ///
    /// Fails with `InvalidRoom` if the room id is blank. The sender is the
    /// session's joined identity, or `Anonymous` if it never joined.
    pub async fn send(
        &self,
        session: &Session,
        room_id: &str,
        text: impl Into<String>,
        client_correlation_id: Value,
    ) -> Result<RelayAck> {
        let room_id = RoomId::parse(room_id)?;
        let sender = session.identity().cloned().unwrap_or_default();
        let text = text.into();

        let relayed = self
            .registry
            .relay_message(&room_id, |server_sequence| ChatMessage {
                room_id: room_id.clone(),
                text,
                sender,
                client_correlation_id,
                server_sequence,
                server_ts: Utc::now(),
            })
            .await;

        let ack = match relayed {
            Some((message, recipients)) => {
                debug!(
                    room = %room_id,
                    connection = %session.connection_id(),
                    sequence = message.server_sequence,
                    recipients,
                    "Message relayed"
                );
                RelayAck {
                    room_id,
                    server_sequence: Some(message.server_sequence),
                    recipients,
                }
            }
            None => {
                debug!(room = %room_id, "Message to room without members dropped");
                RelayAck {
                    room_id,
                    server_sequence: None,
                    recipients: 0,
                }
            }
        };
        Ok(ack)
    }
}
