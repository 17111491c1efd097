use mqtt_publisher::{MqttConfig, Publisher};
use types::{CacheValue, RegisterType};

/// Requires a running MQTT broker reachable at MQTT_TEST_HOST:MQTT_TEST_PORT.
/// Skipped otherwise.
#[tokio::test]
async fn mqtt_publish_integration() {
    let host = match std::env::var("MQTT_TEST_HOST") {
        Ok(value) => value,
        Err(_) => return,
    };
    let port = std::env::var("MQTT_TEST_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1883);

    let publisher = Publisher::connect(MqttConfig {
        broker_host: Some(host),
        port,
        client_id: "modbus-gateway-tests".to_string(),
        topic_prefix: "modbus-gateway-tests".to_string(),
        ..MqttConfig::default()
    });
    assert!(publisher.is_enabled());

    publisher
        .publish(
            "d1",
            RegisterType::Holding,
            0,
            3,
            &CacheValue::Registers(vec![1, 2, 3]),
            1_700_000_000.0,
        )
        .await
        .expect("publish");
}
