//! WebSocket transport for the room relay.

pub mod chat;
pub mod messages;

pub use chat::{chat_ws_handler, ChatWsState};
pub use messages::{Ack, ClientMessage, ServerMessage};
