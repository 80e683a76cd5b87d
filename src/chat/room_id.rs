//! Room identifier generation and normalization.
//!
//! Room ids double as invite codes, so a code typed by hand and the same
//! code decoded from a scanned invite must compare equal.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Result, RoomcastError};

/// Symbols a generated room id is drawn from.
const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of a generated room id.
pub const ROOM_ID_LEN: usize = 6;

/// A normalized, non-empty room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Generate a fresh random room id.
    ///
    /// Uniqueness against active rooms is not checked.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..ROOM_ID_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Normalize externally supplied input into a room id.
    ///
    /// Trims surrounding whitespace and uppercases. Returns `None` when
    /// nothing is left.
    pub fn normalize(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_uppercase()))
        }
    }

    /// Like [`RoomId::normalize`], failing with `InvalidRoom`.
    pub fn parse(input: &str) -> Result<Self> {
        Self::normalize(input).ok_or(RoomcastError::InvalidRoom)
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomcastError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}
