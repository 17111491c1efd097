use std::env;
use std::sync::Mutex;

use gateway_app::config::GatewayConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_KEYS: &[&str] = &[
    "DATABASE_URL",
    "DATABASE_ECHO",
    "MQTT_BROKER_HOST",
    "MQTT_BROKER_PORT",
    "MQTT_USERNAME",
    "MQTT_PASSWORD",
    "MQTT_TOPIC_PREFIX",
    "POLL_INTERVAL_SECONDS",
    "CACHE_TTL_SECONDS",
    "LOG_LEVEL",
    "LOG_JSON",
    "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
    "CIRCUIT_BREAKER_RECOVERY_TIMEOUT",
];

fn clear_env() {
    for key in ENV_KEYS {
        env::remove_var(key);
    }
}

#[test]
fn defaults_validate_cleanly() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();

    let config = GatewayConfig::load().expect("load config");
    assert_eq!(config.database_url, "sqlite://gateway.db");
    assert!(config.mqtt_broker_host.is_none());
    assert_eq!(config.circuit_breaker_failure_threshold, 5);

    clear_env();
}

#[test]
fn mqtt_broker_host_from_env_is_honored() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("MQTT_BROKER_HOST", "broker.local");
    env::set_var("MQTT_BROKER_PORT", "8883");

    let config = GatewayConfig::load().expect("load config");
    assert_eq!(config.mqtt_broker_host.as_deref(), Some("broker.local"));
    assert_eq!(config.mqtt_broker_port, 8883);

    clear_env();
}

#[test]
fn zero_poll_interval_fails_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("POLL_INTERVAL_SECONDS", "0");

    let result = GatewayConfig::load();
    assert!(result.is_err());

    clear_env();
}

#[test]
fn zero_circuit_breaker_threshold_fails_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "0");

    let result = GatewayConfig::load();
    assert!(result.is_err());

    clear_env();
}
