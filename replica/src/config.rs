//! Replica configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_WS_URL: &str = "ws://localhost:1234";
const DEFAULT_DATA_DIR: &str = ".openboard";
const DEFAULT_PENDING_TTL_MS: u64 = 2_000;
const DEFAULT_HEARTBEAT_MS: u64 = 5_000;
const DEFAULT_PRESENCE_TTL_MS: u64 = 15_000;
const DEFAULT_LIVENESS_POLL_MS: u64 = 3_000;
const DEFAULT_RECONNECT_MIN_MS: u64 = 250;
const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;
const DEFAULT_AUTOSAVE_MS: u64 = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("relay url must start with ws:// or wss://, got {0}")]
    BadUrl(String),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("presence heartbeat ({heartbeat:?}) must be shorter than presence ttl ({ttl:?})")]
    HeartbeatTooSlow { heartbeat: Duration, ttl: Duration },
    #[error("reconnect backoff floor ({min:?}) exceeds its cap ({max:?})")]
    BackoffInverted { min: Duration, max: Duration },
}

/// Timers and endpoints for one replica.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Relay base url; the room name is appended as the path.
    pub ws_url: String,
    /// Where the JSON persistence backend keeps boards.
    pub data_dir: PathBuf,
    /// How long a local edit suppresses remote materialization of its id.
    pub pending_ttl: Duration,
    pub heartbeat: Duration,
    /// Remote peers silent for longer than this are dropped.
    pub presence_ttl: Duration,
    pub liveness_poll: Duration,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    /// Quiet period after the last edit before a snapshot is saved.
    pub autosave_delay: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.into(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            pending_ttl: Duration::from_millis(DEFAULT_PENDING_TTL_MS),
            heartbeat: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            presence_ttl: Duration::from_millis(DEFAULT_PRESENCE_TTL_MS),
            liveness_poll: Duration::from_millis(DEFAULT_LIVENESS_POLL_MS),
            reconnect_min: Duration::from_millis(DEFAULT_RECONNECT_MIN_MS),
            reconnect_max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            autosave_delay: Duration::from_millis(DEFAULT_AUTOSAVE_MS),
        }
    }
}

impl ReplicaConfig {
    /// Reads `OPENBOARD_WS_URL`, `OPENBOARD_DATA_DIR` and the
    /// `OPENBOARD_*_MS` timer overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let ms = |key: &str, default: u64| Duration::from_millis(env_parse(key, default));
        Self {
            ws_url: std::env::var("OPENBOARD_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.into()),
            data_dir: std::env::var("OPENBOARD_DATA_DIR").map_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            pending_ttl: ms("OPENBOARD_PENDING_TTL_MS", DEFAULT_PENDING_TTL_MS),
            heartbeat: ms("OPENBOARD_HEARTBEAT_MS", DEFAULT_HEARTBEAT_MS),
            presence_ttl: ms("OPENBOARD_PRESENCE_TTL_MS", DEFAULT_PRESENCE_TTL_MS),
            liveness_poll: ms("OPENBOARD_LIVENESS_POLL_MS", DEFAULT_LIVENESS_POLL_MS),
            reconnect_min: ms("OPENBOARD_RECONNECT_MIN_MS", DEFAULT_RECONNECT_MIN_MS),
            reconnect_max: ms("OPENBOARD_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS),
            autosave_delay: ms("OPENBOARD_AUTOSAVE_MS", DEFAULT_AUTOSAVE_MS),
        }
    }

    /// # Errors
    ///
    /// Rejects a non-WebSocket url, zero timers, a heartbeat that cannot
    /// keep presence alive, and an inverted backoff range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConfigError::BadUrl(self.ws_url.clone()));
        }
        let timers = [
            ("pending ttl", self.pending_ttl),
            ("presence heartbeat", self.heartbeat),
            ("liveness poll", self.liveness_poll),
            ("reconnect backoff", self.reconnect_min),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration(name));
        }
        if self.heartbeat >= self.presence_ttl {
            return Err(ConfigError::HeartbeatTooSlow { heartbeat: self.heartbeat, ttl: self.presence_ttl });
        }
        if self.reconnect_min > self.reconnect_max {
            return Err(ConfigError::BackoffInverted { min: self.reconnect_min, max: self.reconnect_max });
        }
        Ok(())
    }

    /// Full WebSocket url for `room`.
    #[must_use]
    pub fn room_url(&self, room: &str) -> String {
        format!("{}/{}", self.ws_url.trim_end_matches('/'), room)
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
