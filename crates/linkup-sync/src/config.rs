//! Sync layer configuration.
//!
//! Every field has a default, so an empty document is a valid config.
//!
//! ```toml
//! [realtime]
//! url = "wss://api.example.com/ws"
//! reconnect_attempts = 5
//! reconnect_delay_ms = 1000
//!
//! [throttle]
//! unread_count_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::connection::ReconnectPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Realtime connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket endpoint.
    #[serde(default = "default_url")]
    pub url: String,

    /// Consecutive failed attempts before giving up.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Fixed delay between attempts.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Inbound event buffer per connection.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Minimum intervals between fetches of the same resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_unread_count_ms")]
    pub unread_count_ms: u64,

    /// Per direction.
    #[serde(default = "default_requests_ms")]
    pub requests_ms: u64,

    #[serde(default = "default_stats_ms")]
    pub stats_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Page size for list fetches.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay() -> u64 {
    1_000
}

fn default_event_capacity() -> usize {
    256
}

fn default_unread_count_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_requests_ms() -> u64 {
    2_000
}

fn default_stats_ms() -> u64 {
    60_000 // 1 minute
}

fn default_page_size() -> u32 {
    20
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            unread_count_ms: default_unread_count_ms(),
            requests_ms: default_requests_ms(),
            stats_ms: default_stats_ms(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl SyncConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not valid TOML or a
    /// field has the wrong type.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

impl RealtimeConfig {
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts.max(1),
            delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }
}
