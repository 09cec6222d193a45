//! Relay configuration loaded from environment variables.

use std::time::Duration;

const DEFAULT_PORT: u16 = 1234;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
const DEFAULT_ROOM_GRACE_MS: u64 = 30_000;
const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CLIENT_QUEUE_CAPACITY must be at least 1")]
    ZeroQueueCapacity,
    #[error("MAX_MESSAGE_BYTES must be at least 2")]
    MessageLimitTooSmall,
}

/// Tuning knobs for the relay, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub port: u16,
    /// How long an empty room keeps its buffered state before eviction.
    pub room_grace: Duration,
    /// Bounded outbound queue per connection. A peer that falls this far
    /// behind is dropped from its room.
    pub client_queue_capacity: usize,
    /// Largest inbound WebSocket message accepted.
    pub max_message_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            port: DEFAULT_PORT,
            room_grace: Duration::from_millis(DEFAULT_ROOM_GRACE_MS),
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl RelayConfig {
    /// `PORT` wins over the legacy `WS_PORT`.
    #[must_use]
    pub fn from_env() -> Self {
        let port = env_parse("PORT", env_parse("WS_PORT", DEFAULT_PORT));
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into()),
            port,
            room_grace: Duration::from_millis(env_parse("ROOM_GRACE_MS", DEFAULT_ROOM_GRACE_MS)),
            client_queue_capacity: env_parse("CLIENT_QUEUE_CAPACITY", DEFAULT_CLIENT_QUEUE_CAPACITY),
            max_message_bytes: env_parse("MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES),
        }
    }

    /// # Errors
    ///
    /// Rejects values that would panic or make the relay unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_message_bytes < 2 {
            return Err(ConfigError::MessageLimitTooSmall);
        }
        Ok(())
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
