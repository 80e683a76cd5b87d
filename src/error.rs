//! Error types for roomcast.

use std::time::Duration;

use thiserror::Error;

/// Common error type for roomcast.
#[derive(Error, Debug)]
pub enum RoomcastError {
    /// Room id was empty or missing.
    #[error("roomId required")]
    InvalidRoom,

    /// Connection-level failure of the realtime channel.
    ///
    /// Covers failing to connect, the connection closing under an in-flight
    /// request, and acknowledgments that never arrive.
    #[error("transport error: {0}")]
    Transport(String),

    /// Per-connection event budget exhausted.
    #[error("rate limited, retry after {}ms", retry_after.as_millis())]
    RateLimited {
        /// Time until the budget frees up.
        retry_after: Duration,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RoomcastError {
    /// Machine-readable reason carried in failed acknowledgments.
    pub fn reason(&self) -> &'static str {
        match self {
            RoomcastError::InvalidRoom => "invalid_room",
            RoomcastError::Transport(_) => "transport",
            RoomcastError::RateLimited { .. } => "rate_limited",
            RoomcastError::Io(_) => "io",
            RoomcastError::Json(_) => "json",
            RoomcastError::Config(_) => "config",
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RoomcastError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        RoomcastError::Transport(e.to_string())
    }
}

/// Result type alias for roomcast operations.
pub type Result<T> = std::result::Result<T, RoomcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_room_display() {
        let err = RoomcastError::InvalidRoom;
        assert_eq!(err.to_string(), "roomId required");
        assert_eq!(err.reason(), "invalid_room");
    }

    #[test]
    fn test_transport_error_display() {
        let err = RoomcastError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn test_rate_limited_display() {
        let err = RoomcastError::RateLimited {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 1500ms");
        assert_eq!(err.reason(), "rate_limited");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RoomcastError = io_err.into();
        assert!(matches!(err, RoomcastError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(RoomcastError::InvalidRoom)
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
