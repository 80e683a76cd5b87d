//! roomcast - realtime room chat relay
//!
//! Participants join short-coded rooms over WebSocket, exchange messages in
//! one relay-defined order per room, see who is present and see who is
//! typing.

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod web;

pub use chat::{
    ChatMessage, ConnectionId, Identity, MemberSnapshot, MessageRelay, RoomEvent, RoomId,
    RoomRegistry, Session, SessionManager, TypingRelay, TypingSignal,
};
pub use client::{ChatView, ClientConfig, ClientEvent, LocalStore, RoomClient};
pub use config::Config;
pub use error::{Result, RoomcastError};
pub use rate_limit::{RateLimitConfig, RateLimiters};
pub use web::WebServer;
