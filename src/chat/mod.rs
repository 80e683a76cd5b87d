//! Room coordination for roomcast.
//!
//! This module provides the server-side core of the relay:
//! - Room ids (generation and normalization)
//! - Sessions and their room membership
//! - The room registry with presence broadcast
//! - Message relay with per-room sequence numbers
//! - Typing indicators (debounce, relay, leases)

mod registry;
mod relay;
mod room;
mod room_id;
mod session;
pub mod typing;

pub use registry::RoomRegistry;
pub use relay::{ChatMessage, MessageRelay, RelayAck};
pub use room::{ConnectionId, Identity, Member, MemberSnapshot, Outbox, RoomEvent, ANONYMOUS};
pub use room_id::{RoomId, ROOM_ID_LEN};
pub use session::{Session, SessionManager};
pub use typing::{TypingDebouncer, TypingEmitter, TypingLeases, TypingRelay, TypingSignal};
