//! Room registry for roomcast.
//!
//! Shared map of rooms to their members. The outer map lock is only held to
//! look up, create or evict a room; membership changes, sequence assignment
//! and fan-out happen under the room's own lock so rooms never contend with
//! each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::relay::ChatMessage;
use super::room::{ConnectionId, Identity, Member, MemberSnapshot, Room, RoomEvent};
use super::room_id::RoomId;

type RoomHandle = Arc<Mutex<Room>>;

/// Registry of active rooms.
pub struct RoomRegistry {
    /// Rooms indexed by ID.
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.read().await.get(room_id).cloned()
    }

    async fn get_or_create(&self, room_id: &RoomId) -> RoomHandle {
        if let Some(room) = self.get(room_id).await {
            return room;
        }

        let mut rooms = self.rooms.write().await;
        Arc::clone(rooms.entry(room_id.clone()).or_insert_with(|| {
            debug!(room = %room_id, "Room created");
            Arc::new(Mutex::new(Room::new(room_id.clone())))
        }))
    }

    /// Add a member to a room, creating the room if needed.
    ///
    /// A connection that is already a member keeps its position and has its
    /// identity overwritten. Broadcasts the new snapshot to every member,
    /// including the one that just joined.
    pub async fn add_member(&self, room_id: &RoomId, member: Member) -> MemberSnapshot {
        loop {
            let handle = self.get_or_create(room_id).await;
            let mut room = handle.lock().await;

            // Evicted between lookup and lock; the map no longer holds it.
            if room.is_closed() {
                continue;
            }

            let connection_id = member.connection_id;
            let added = room.upsert(member);
            let snapshot = room.snapshot();
            room.broadcast(&RoomEvent::Presence(snapshot.clone()));

            debug!(
                room = %room_id,
                connection = %connection_id,
                added,
                members = snapshot.len(),
                "Member joined"
            );
            return snapshot;
        }
    }

    /// Remove a member from a room.
    ///
    /// Returns `None` without broadcasting if the room or member does not
    /// exist. Otherwise the remaining members get the new snapshot, and the
    /// room is evicted once nobody is left.
    pub async fn remove_member(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
    ) -> Option<MemberSnapshot> {
        let handle = self.get(room_id).await?;
        let mut room = handle.lock().await;
        room.remove(connection_id)?;

        let snapshot = room.snapshot();
        if room.is_empty() {
            room.close();
            let mut rooms = self.rooms.write().await;
            if rooms
                .get(room_id)
                .is_some_and(|current| Arc::ptr_eq(current, &handle))
            {
                rooms.remove(room_id);
            }
            debug!(room = %room_id, "Room evicted");
        } else {
            room.broadcast(&RoomEvent::Presence(snapshot.clone()));
        }

        debug!(
            room = %room_id,
            connection = %connection_id,
            members = snapshot.len(),
            "Member left"
        );
        Some(snapshot)
    }

    /// Current members of a room in join order.
    pub async fn snapshot(&self, room_id: &RoomId) -> Vec<Identity> {
        match self.get(room_id).await {
            Some(handle) => handle.lock().await.snapshot().members,
            None => Vec::new(),
        }
    }

    /// Sequence a message and push it to every member, sender included.
    ///
    /// Sequence assignment and fan-out happen under the room lock, so all
    /// members observe the room's messages in one order. Returns `None`
    /// when the room has no members.
    pub(crate) async fn relay_message(
        &self,
        room_id: &RoomId,
        build: impl FnOnce(u64) -> ChatMessage,
    ) -> Option<(ChatMessage, usize)> {
        let handle = self.get(room_id).await?;
        let mut room = handle.lock().await;
        if room.is_closed() {
            return None;
        }

        let message = build(room.next_sequence());
        let recipients = room.broadcast(&RoomEvent::Message(message.clone()));
        Some((message, recipients))
    }

    /// Push an event to every member of a room except one connection.
    ///
    /// Missing rooms are ignored.
    pub(crate) async fn broadcast_except(
        &self,
        room_id: &RoomId,
        except: &ConnectionId,
        event: RoomEvent,
    ) -> usize {
        match self.get(room_id).await {
            Some(handle) => handle.lock().await.broadcast_except(except, &event),
            None => 0,
        }
    }

    /// Whether a room currently exists.
    pub async fn is_active(&self, room_id: &RoomId) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    /// Whether a connection is a member of a room.
    pub async fn is_member(&self, room_id: &RoomId, connection_id: &ConnectionId) -> bool {
        match self.get(room_id).await {
            Some(handle) => handle.lock().await.contains(connection_id),
            None => false,
        }
    }

    /// Number of members in a room.
    pub async fn member_count(&self, room_id: &RoomId) -> usize {
        match self.get(room_id).await {
            Some(handle) => handle.lock().await.len(),
            None => 0,
        }
    }

    /// Number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Ids of all active rooms, sorted.
    pub async fn room_ids(&self) -> Vec<RoomId> {
        let rooms = self.rooms.read().await;
        let mut ids: Vec<RoomId> = rooms.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
