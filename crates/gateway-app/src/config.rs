use std::env;
use std::time::Duration;

use anyhow::{bail, Result};

const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTT_TOPIC_PREFIX: &str = "modbus/data";
const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;
const DEFAULT_CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_CIRCUIT_RECOVERY_TIMEOUT_SECONDS: u64 = 30;

/// Process configuration, loaded entirely from the environment. No file
/// config support: the external contract here is environment-only.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub database_url: String,
    pub database_echo: bool,

    pub mqtt_broker_host: Option<String>,
    pub mqtt_broker_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,

    pub poll_interval: Duration,
    pub cache_ttl_seconds: u64,

    pub log_level: String,
    pub log_json: bool,

    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_recovery_timeout: Duration,
}

impl GatewayConfig {
    pub fn load() -> Result<Self> {
        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://gateway.db".to_string()),
            database_echo: parse_env_bool("DATABASE_ECHO").unwrap_or(false),

            mqtt_broker_host: env::var("MQTT_BROKER_HOST").ok().filter(|v| !v.trim().is_empty()),
            mqtt_broker_port: parse_env_u16("MQTT_BROKER_PORT").unwrap_or(DEFAULT_MQTT_PORT),
            mqtt_username: env::var("MQTT_USERNAME").ok(),
            mqtt_password: env::var("MQTT_PASSWORD").ok(),
            mqtt_topic_prefix: env::var("MQTT_TOPIC_PREFIX")
                .unwrap_or_else(|_| DEFAULT_MQTT_TOPIC_PREFIX.to_string()),

            poll_interval: Duration::from_secs(
                parse_env_u64("POLL_INTERVAL_SECONDS").unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS),
            ),
            cache_ttl_seconds: parse_env_u64("CACHE_TTL_SECONDS").unwrap_or(DEFAULT_CACHE_TTL_SECONDS),

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            log_json: parse_env_bool("LOG_JSON").unwrap_or(false),

            circuit_breaker_failure_threshold: parse_env_u32("CIRCUIT_BREAKER_FAILURE_THRESHOLD")
                .unwrap_or(DEFAULT_CIRCUIT_FAILURE_THRESHOLD),
            circuit_breaker_recovery_timeout: Duration::from_secs(
                parse_env_u64("CIRCUIT_BREAKER_RECOVERY_TIMEOUT")
                    .unwrap_or(DEFAULT_CIRCUIT_RECOVERY_TIMEOUT_SECONDS),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            bail!("DATABASE_URL must not be empty");
        }
        if self.mqtt_broker_port == 0 {
            bail!("MQTT_BROKER_PORT must be between 1 and 65535");
        }
        if self.mqtt_topic_prefix.trim().is_empty() {
            bail!("MQTT_TOPIC_PREFIX must not be empty");
        }
        if self.poll_interval.as_millis() == 0 {
            bail!("POLL_INTERVAL_SECONDS must be >= 1");
        }
        if self.cache_ttl_seconds == 0 {
            bail!("CACHE_TTL_SECONDS must be >= 1");
        }
        if self.circuit_breaker_failure_threshold == 0 {
            bail!("CIRCUIT_BREAKER_FAILURE_THRESHOLD must be >= 1");
        }
        if self.circuit_breaker_recovery_timeout.as_millis() == 0 {
            bail!("CIRCUIT_BREAKER_RECOVERY_TIMEOUT must be >= 1");
        }
        Ok(())
    }
}

fn parse_env_u16(key: &str) -> Option<u16> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in [
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
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_apply_when_env_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let config = GatewayConfig::load().unwrap();
        assert_eq!(config.mqtt_broker_port, DEFAULT_MQTT_PORT);
        assert!(config.mqtt_broker_host.is_none());
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.circuit_breaker_failure_threshold, 5);
    }

    #[test]
    fn mqtt_broker_host_enables_mqtt() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        env::set_var("MQTT_BROKER_HOST", "broker.local");
        let config = GatewayConfig::load().unwrap();
        assert_eq!(config.mqtt_broker_host, Some("broker.local".to_string()));
        clear_all();
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        env::set_var("POLL_INTERVAL_SECONDS", "0");
        assert!(GatewayConfig::load().is_err());
        clear_all();
    }
}
