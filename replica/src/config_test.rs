use super::*;

#[test]
fn defaults_are_valid() {
    let config = ReplicaConfig::default();
    assert_eq!(config.ws_url, "ws://localhost:1234");
    assert_eq!(config.pending_ttl, Duration::from_secs(2));
    assert_eq!(config.presence_ttl, Duration::from_secs(15));
    assert!(config.heartbeat < config.presence_ttl);
    assert!(config.validate().is_ok());
}

#[test]
fn room_url_joins_without_double_slash() {
    let config = ReplicaConfig { ws_url: "ws://relay.local:9000/".into(), ..ReplicaConfig::default() };
    assert_eq!(config.room_url("openboard-calm-otter-7"), "ws://relay.local:9000/openboard-calm-otter-7");
}

#[test]
fn http_url_is_rejected() {
    let config = ReplicaConfig { ws_url: "http://localhost:1234".into(), ..ReplicaConfig::default() };
    assert!(matches!(config.validate(), Err(ConfigError::BadUrl(_))));
}

#[test]
fn zero_pending_ttl_is_rejected() {
    let config = ReplicaConfig { pending_ttl: Duration::ZERO, ..ReplicaConfig::default() };
    assert!(matches!(config.validate(), Err(ConfigError::ZeroDuration("pending ttl"))));
}

#[test]
fn heartbeat_must_beat_presence_ttl() {
    let config = ReplicaConfig { heartbeat: Duration::from_secs(15), ..ReplicaConfig::default() };
    assert!(matches!(config.validate(), Err(ConfigError::HeartbeatTooSlow { .. })));
}

#[test]
fn inverted_backoff_is_rejected() {
    let config = ReplicaConfig {
        reconnect_min: Duration::from_secs(20),
        reconnect_max: Duration::from_secs(10),
        ..ReplicaConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::BackoffInverted { .. })));
}

#[test]
fn env_parse_falls_back_on_missing_key() {
    assert_eq!(env_parse("OPENBOARD_TEST_SURELY_UNSET_KEY", 42_u64), 42);
}
