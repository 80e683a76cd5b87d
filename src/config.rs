//! Configuration module for roomcast.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;
use crate::{Result, RoomcastError};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

/// Per-connection event budgets.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Chat messages allowed per window.
    #[serde(default = "default_message_max")]
    pub message_max: u32,
    /// Chat message window in seconds.
    #[serde(default = "default_message_window")]
    pub message_window_secs: u64,
    /// Typing events allowed per window.
    #[serde(default = "default_typing_max")]
    pub typing_max: u32,
    /// Typing event window in seconds.
    #[serde(default = "default_typing_window")]
    pub typing_window_secs: u64,
}

fn default_message_max() -> u32 {
    20
}

fn default_message_window() -> u64 {
    10
}

fn default_typing_max() -> u32 {
    60
}

fn default_typing_window() -> u64 {
    10
}

impl RateLimitSettings {
    /// Budget for chat messages.
    pub fn messages(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.message_max, self.message_window_secs)
    }

    /// Budget for typing events.
    pub fn typing(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.typing_max, self.typing_window_secs)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            message_max: default_message_max(),
            message_window_secs: default_message_window(),
            typing_max: default_typing_max(),
            typing_window_secs: default_typing_window(),
        }
    }
}

/// Typing indicator timing.
#[derive(Debug, Clone, Deserialize)]
pub struct TypingConfig {
    /// Quiet period after the last keystroke before a stop is emitted.
    #[serde(default = "default_quiet_period")]
    pub quiet_period_ms: u64,
    /// How long a received typing start stays valid without a refresh.
    #[serde(default = "default_lease")]
    pub lease_ms: u64,
}

fn default_quiet_period() -> u64 {
    800
}

fn default_lease() -> u64 {
    2000
}

impl TypingConfig {
    /// Quiet period as a duration.
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    /// Lease window as a duration.
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period(),
            lease_ms: default_lease(),
        }
    }
}

/// Client library configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    /// WebSocket URL of the relay.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// How long to wait for an acknowledgment.
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_ms: u64,
    /// Path of the local profile and room history file.
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

fn default_server_url() -> String {
    "ws://127.0.0.1:3000/ws".to_string()
}

fn default_ack_timeout() -> u64 {
    5000
}

fn default_store_path() -> String {
    "data/roomcast.json".to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            ack_timeout_ms: default_ack_timeout(),
            store_path: default_store_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/roomcast.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limits.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Typing indicator timing.
    #[serde(default)]
    pub typing: TypingConfig,
    /// Client configuration.
    #[serde(default)]
    pub client: ClientSettings,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RoomcastError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RoomcastError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `ROOMCAST_PORT`: listen port (highest priority)
    /// - `PORT`: listen port
    pub fn apply_env_overrides(&mut self) {
        for var in ["PORT", "ROOMCAST_PORT"] {
            if let Some(port) = std::env::var(var).ok().and_then(|p| p.parse().ok()) {
                self.server.port = port;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.message_window_secs == 0 || self.rate_limit.typing_window_secs == 0 {
            return Err(RoomcastError::Config(
                "rate limit windows must be at least one second".to_string(),
            ));
        }
        if self.rate_limit.message_max == 0 || self.rate_limit.typing_max == 0 {
            return Err(RoomcastError::Config(
                "rate limit maximums must be at least one".to_string(),
            ));
        }
        if self.typing.quiet_period_ms == 0 || self.typing.lease_ms == 0 {
            return Err(RoomcastError::Config(
                "typing quiet period and lease must be non-zero".to_string(),
            ));
        }
        if self.client.ack_timeout_ms == 0 {
            return Err(RoomcastError::Config(
                "ack_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
