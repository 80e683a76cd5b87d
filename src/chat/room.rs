//! Room state for roomcast.
//!
//! A room is an ordered member list plus the sequence counter for its
//! messages. Every access goes through the room's own lock held by the
//! [`RoomRegistry`](super::RoomRegistry).

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::relay::ChatMessage;
use super::room_id::RoomId;

/// Display name used when none was given.
pub const ANONYMOUS: &str = "Anonymous";

/// Who a participant says they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Display name, never blank.
    #[serde(default)]
    pub display_name: String,
    /// Avatar URI. Not validated.
    #[serde(default)]
    pub avatar_ref: String,
}

impl Identity {
    /// Create a new identity, falling back to `Anonymous` for a blank name.
    pub fn new(display_name: impl Into<String>, avatar_ref: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_ref: avatar_ref.into(),
        }
        .sanitized()
    }

    /// Trim the display name and replace a blank one with `Anonymous`.
    pub fn sanitized(mut self) -> Self {
        let trimmed = self.display_name.trim();
        self.display_name = if trimmed.is_empty() {
            ANONYMOUS.to_string()
        } else {
            trimmed.to_string()
        };
        self
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new(ANONYMOUS, "")
    }
}

/// Opaque handle for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a new unique connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Events a room pushes to its members.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// Full member list after a membership change.
    Presence(MemberSnapshot),
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
}

/// Sending half of a connection's event queue.
pub type Outbox = mpsc::UnboundedSender<RoomEvent>;

/// A room member.
#[derive(Debug, Clone)]
pub struct Member {
    /// Connection the member is bound to.
    pub connection_id: ConnectionId,
    /// Identity supplied at join time.
    pub identity: Identity,
    /// Where room events for this member go.
    pub outbox: Outbox,
}

impl Member {
    /// Create a new member.
    pub fn new(connection_id: ConnectionId, identity: Identity, outbox: Outbox) -> Self {
        Self {
            connection_id,
            identity,
            outbox,
        }
    }
}

/// Ordered member identities of a room at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    /// Room the snapshot belongs to.
    pub room_id: RoomId,
    /// Members in join order.
    pub members: Vec<Identity>,
}

impl MemberSnapshot {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the room has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Mutable state of one room.
#[derive(Debug)]
pub(crate) struct Room {
    id: RoomId,
    members: Vec<Member>,
    last_sequence: u64,
    closed: bool,
}

impl Room {
    pub(crate) fn new(id: RoomId) -> Self {
        Self {
            id,
            members: Vec::new(),
            last_sequence: 0,
            closed: false,
        }
    }

    /// Whether the room was evicted from the registry.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    /// Insert a member, or overwrite an existing entry in place.
    ///
    /// Returns true if the connection was not a member before.
    pub(crate) fn upsert(&mut self, member: Member) -> bool {
        match self
            .members
            .iter_mut()
            .find(|m| m.connection_id == member.connection_id)
        {
            Some(existing) => {
                *existing = member;
                false
            }
            None => {
                self.members.push(member);
                true
            }
        }
    }

    pub(crate) fn remove(&mut self, connection_id: &ConnectionId) -> Option<Member> {
        let index = self
            .members
            .iter()
            .position(|m| &m.connection_id == connection_id)?;
        Some(self.members.remove(index))
    }

    pub(crate) fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.iter().any(|m| &m.connection_id == connection_id)
    }

    pub(crate) fn snapshot(&self) -> MemberSnapshot {
        MemberSnapshot {
            room_id: self.id.clone(),
            members: self.members.iter().map(|m| m.identity.clone()).collect(),
        }
    }

    /// Assign the next message sequence number. Starts at 1.
    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    /// Push an event to every member.
    ///
    /// Returns the number of members whose connection was still open.
    pub(crate) fn broadcast(&self, event: &RoomEvent) -> usize {
        self.members
            .iter()
            .filter(|m| m.outbox.send(event.clone()).is_ok())
            .count()
    }

    /// Push an event to every member except one connection.
    pub(crate) fn broadcast_except(&self, except: &ConnectionId, event: &RoomEvent) -> usize {
        self.members
            .iter()
            .filter(|m| &m.connection_id != except)
            .filter(|m| m.outbox.send(event.clone()).is_ok())
            .count()
    }
}
