use super::*;

#[test]
fn defaults_match_reference_deployment() {
    let config = RelayConfig::default();
    assert_eq!(config.port, 1234);
    assert_eq!(config.room_grace, Duration::from_secs(30));
    assert_eq!(config.client_queue_capacity, 256);
    assert_eq!(config.listen_addr(), "0.0.0.0:1234");
    assert!(config.validate().is_ok());
}

#[test]
fn zero_queue_capacity_is_rejected() {
    let config = RelayConfig { client_queue_capacity: 0, ..RelayConfig::default() };
    assert!(matches!(config.validate(), Err(ConfigError::ZeroQueueCapacity)));
}

#[test]
fn tiny_message_limit_is_rejected() {
    let config = RelayConfig { max_message_bytes: 1, ..RelayConfig::default() };
    assert!(matches!(config.validate(), Err(ConfigError::MessageLimitTooSmall)));
}

#[test]
fn env_parse_falls_back_on_missing_key() {
    assert_eq!(env_parse("RELAY_TEST_SURELY_UNSET_KEY", 17_u16), 17);
}
