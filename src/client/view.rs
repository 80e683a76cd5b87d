//! Client-side view of one room.
//!
//! Holds what a chat screen shows: messages in relay order, the member list
//! and who is typing.

use std::time::Duration;

use tokio::time::Instant;

use crate::chat::typing::TypingLeases;
use crate::chat::{ChatMessage, Identity, RoomId};

use super::ClientEvent;

/// How a message body should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBody<'a> {
    /// Plain text.
    Text(&'a str),
    /// An animated image to render from its URI.
    AnimatedImage(&'a str),
}

impl<'a> MessageBody<'a> {
    /// Classify message text.
    ///
    /// An `http://` or `https://` URI containing `.gif` (any case) is an
    /// animated image; everything else is text.
    pub fn classify(text: &'a str) -> Self {
        let lower = text.to_lowercase();
        let is_web_uri = lower.starts_with("http://") || lower.starts_with("https://");
        if is_web_uri && lower.contains(".gif") {
            MessageBody::AnimatedImage(text)
        } else {
            MessageBody::Text(text)
        }
    }
}

/// State of the room currently shown.
#[derive(Debug)]
pub struct ChatView {
    room_id: Option<RoomId>,
    messages: Vec<ChatMessage>,
    members: Vec<Identity>,
    typing: TypingLeases,
}

impl ChatView {
    /// Create an empty view whose typing indicators last `lease`.
    pub fn new(lease: Duration) -> Self {
        Self {
            room_id: None,
            messages: Vec::new(),
            members: Vec::new(),
            typing: TypingLeases::new(lease),
        }
    }

    /// Switch to another room, dropping everything shown for the old one.
    pub fn enter(&mut self, room_id: RoomId) {
        self.room_id = Some(room_id);
        self.messages.clear();
        self.members.clear();
        self.typing.clear();
    }

    /// Room shown, if any.
    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.as_ref()
    }

    /// Apply one event from the relay.
    ///
    /// Events for a room other than the one shown are ignored. Typing leases
    /// that ran out by `now` are swept first.
    pub fn apply(&mut self, event: &ClientEvent, now: Instant) {
        self.typing.expire(now);
        match event {
            ClientEvent::Message(message) => {
                if self.is_current(&message.room_id) {
                    self.messages.push(message.clone());
                }
            }
            ClientEvent::Typing {
                room_id,
                typing,
                identity,
            } => {
                if self.is_current(room_id) {
                    self.typing.apply(&identity.display_name, *typing, now);
                }
            }
            ClientEvent::Presence(snapshot) => {
                if self.is_current(&snapshot.room_id) {
                    self.members = snapshot.members.clone();
                }
            }
            ClientEvent::Disconnected => {
                self.members.clear();
                self.typing.clear();
            }
            ClientEvent::ConnectionError(_) => {}
        }
    }

    fn is_current(&self, room_id: &RoomId) -> bool {
        self.room_id.as_ref() == Some(room_id)
    }

    /// Messages in relay order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Current members in join order.
    pub fn members(&self) -> &[Identity] {
        &self.members
    }

    /// Clear typing indicators whose lease ran out. Returns who stopped.
    pub fn expire_typing(&mut self, now: Instant) -> Vec<String> {
        self.typing.expire(now)
    }

    /// When the next typing indicator runs out.
    pub fn next_typing_expiry(&self) -> Option<Instant> {
        self.typing.next_expiry()
    }

    /// Names typing at `now`, sorted.
    pub fn typing_names(&self, now: Instant) -> Vec<String> {
        self.typing.typing_subjects(now)
    }

    /// Status line at `now`, such as `Alice, Bob typing…`.
    pub fn typing_line(&self, now: Instant) -> Option<String> {
        let names = self.typing_names(now);
        if names.is_empty() {
            None
        } else {
            Some(format!("{} typing…", names.join(", ")))
        }
    }
}
