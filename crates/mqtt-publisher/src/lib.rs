#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use types::{CacheValue, RegisterType};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Broker connection parameters. `broker_host = None` means MQTT is
/// unconfigured: the publisher becomes a no-op and every `publish` call
/// returns immediately without touching the network.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: Option<String>,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub qos: u8,
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: None,
            port: 1883,
            client_id: "modbus-gateway".to_string(),
            username: None,
            password: None,
            topic_prefix: "modbus".to_string(),
            qos: 0,
            keep_alive: Duration::from_secs(5),
        }
    }
}

/// Wire payload for one published reading: `{device_id, register_type,
/// address, count, values, timestamp}`.
#[derive(Debug, Clone, Serialize)]
struct ReadingPayload {
    device_id: String,
    register_type: RegisterType,
    address: u16,
    count: u16,
    values: serde_json::Value,
    timestamp: f64,
}

fn values_to_json(value: &CacheValue) -> serde_json::Value {
    match value {
        CacheValue::Registers(values) => serde_json::to_value(values).unwrap_or_default(),
        CacheValue::Bits(values) => serde_json::to_value(values).unwrap_or_default(),
    }
}

fn qos_from(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Fire-and-forget MQTT publisher. A background task keeps polling the
/// event loop so `rumqttc`'s own reconnect-with-backoff logic runs for the
/// lifetime of the process; publish failures are logged, never propagated
/// as something the caller needs to handle.
#[derive(Clone)]
pub struct Publisher {
    client: Option<AsyncClient>,
    topic_prefix: String,
    qos: QoS,
    connected: Arc<AtomicBool>,
}

impl Publisher {
    /// Connects and spawns the event-loop-polling task, or returns a
    /// no-op publisher if `broker_host` is unset.
    pub fn connect(config: MqttConfig) -> Self {
        let Some(host) = config.broker_host.clone() else {
            info!("MQTT broker not configured, publisher is a no-op");
            return Self {
                client: None,
                topic_prefix: config.topic_prefix,
                qos: qos_from(config.qos),
                connected: Arc::new(AtomicBool::new(false)),
            };
        };

        let mut options = MqttOptions::new(config.client_id.clone(), host, config.port);
        options.set_keep_alive(config.keep_alive);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 64);
        let connected = Arc::new(AtomicBool::new(false));
        let connected_task = connected.clone();

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt broker connection established");
                        connected_task.store(true, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "mqtt event loop error, retrying");
                        connected_task.store(false, Ordering::Relaxed);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client: Some(client),
            topic_prefix: config.topic_prefix,
            qos: qos_from(config.qos),
            connected,
        }
    }

    pub fn new_noop() -> Self {
        Self {
            client: None,
            topic_prefix: "modbus".to_string(),
            qos: QoS::AtMostOnce,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a broker was configured at all, regardless of live
    /// connection state. Used to decide whether publishing is wired up.
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Whether a configured publisher currently holds a live broker
    /// connection. Always `false` for the no-op publisher.
    pub fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected.load(Ordering::Relaxed)
    }

    /// Publish one reading. Never returns an error the caller must act
    /// on beyond logging/counting; still surfaces `Result` so the poller
    /// can bump a `publish_failed` metric per call site.
    pub async fn publish(
        &self,
        device_id: &str,
        register_type: RegisterType,
        address: u16,
        count: u16,
        values: &CacheValue,
        timestamp_unix: f64,
    ) -> Result<(), PublishError> {
        let Some(client) = &self.client else {
            debug!(device_id, "mqtt publish skipped, no-op publisher");
            return Ok(());
        };

        let payload = ReadingPayload {
            device_id: device_id.to_string(),
            register_type,
            address,
            count,
            values: values_to_json(values),
            timestamp: timestamp_unix,
        };
        let body = serde_json::to_vec(&payload)?;
        let topic = format!("{}/{}/{}/{}", self.topic_prefix, device_id, register_type, address);

        client.publish(topic, self.qos, false, body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_to_json_encodes_registers() {
        let json = values_to_json(&CacheValue::Registers(vec![1, 2, 3]));
        assert_eq!(json, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn values_to_json_encodes_bits() {
        let json = values_to_json(&CacheValue::Bits(vec![true, false]));
        assert_eq!(json, serde_json::json!([true, false]));
    }

    #[tokio::test]
    async fn noop_publisher_never_touches_network() {
        let publisher = Publisher::new_noop();
        assert!(!publisher.is_enabled());
        let result = publisher
            .publish("d1", RegisterType::Holding, 0, 1, &CacheValue::Registers(vec![1]), 0.0)
            .await;
        assert!(result.is_ok());
    }
}
