//! Session lifecycle.
//!
//! A [`Session`] is the server-side state of one live connection: who it
//! says it is and which room, if any, it is in. The [`SessionManager`]
//! moves sessions in and out of rooms through the registry.

use std::sync::Arc;

use tracing::debug;

use super::registry::RoomRegistry;
use super::room::{ConnectionId, Identity, Member, MemberSnapshot, Outbox};
use super::room_id::RoomId;
use crate::Result;

/// State bound to one live connection.
#[derive(Debug)]
pub struct Session {
    connection_id: ConnectionId,
    identity: Option<Identity>,
    current_room: Option<RoomId>,
    outbox: Outbox,
}

impl Session {
    /// Connection this session belongs to.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Identity supplied on the last join.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Room the session is currently in.
    pub fn current_room(&self) -> Option<&RoomId> {
        self.current_room.as_ref()
    }
}

/// Moves sessions in and out of rooms.
#[derive(Clone)]
pub struct SessionManager {
    registry: Arc<RoomRegistry>,
}

impl SessionManager {
    /// Create a manager over a registry.
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Allocate a session for a new connection.
    pub fn on_connect(&self, outbox: Outbox) -> Session {
        let session = Session {
            connection_id: ConnectionId::new(),
            identity: None,
            current_room: None,
            outbox,
        };
        debug!(connection = %session.connection_id, "Session opened");
        session
    }

    /// Join a room.
    ///
    /// A session already in a different room leaves it first, so a
    /// connection is never a member of two rooms.
    pub async fn join(
        &self,
        session: &mut Session,
        room_id: &str,
        identity: Identity,
    ) -> Result<MemberSnapshot> {
        let room_id = RoomId::parse(room_id)?;
        let identity = identity.sanitized();

        if session.current_room.as_ref() != Some(&room_id) {
            self.leave(session).await;
        }

        session.identity = Some(identity.clone());
        let member = Member::new(session.connection_id, identity, session.outbox.clone());
        let snapshot = self.registry.add_member(&room_id, member).await;
        session.current_room = Some(room_id);
        Ok(snapshot)
    }

    /// Leave the current room. No-op if the session is not in one.
    pub async fn leave(&self, session: &mut Session) -> Option<MemberSnapshot> {
        let room_id = session.current_room.take()?;
        self.registry
            .remove_member(&room_id, &session.connection_id)
            .await
    }

    /// Tear down a session whose connection closed.
    pub async fn on_disconnect(&self, mut session: Session) {
        self.leave(&mut session).await;
        debug!(connection = %session.connection_id, "Session closed");
    }
}
