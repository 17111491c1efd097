use chrono::Utc;
use modbus_client::ModbusManager;
use types::{DeviceConfig, Framer, RegisterType};

/// Requires a running Modbus TCP simulator (e.g. `diagslave`) reachable at
/// MODBUS_TEST_HOST:MODBUS_TEST_PORT. Skipped otherwise.
#[tokio::test]
async fn diagslave_integration_read() {
    let host = match std::env::var("MODBUS_TEST_HOST") {
        Ok(value) => value,
        Err(_) => return,
    };

    let port = env_u16("MODBUS_TEST_PORT").unwrap_or(1502);
    let slave_id = env_u16("MODBUS_TEST_UNIT_ID").unwrap_or(1) as u8;
    let address = env_u16("MODBUS_TEST_START").unwrap_or(0);
    let count = env_u16("MODBUS_TEST_COUNT").unwrap_or(8);

    let manager = ModbusManager::new();
    let now = Utc::now();
    manager
        .reload(vec![DeviceConfig {
            device_id: "diagslave".to_string(),
            host,
            port,
            slave_id,
            timeout_seconds: 2,
            framer: Framer::Socket,
            max_retries: 1,
            retry_delay_seconds: 0.1,
            is_active: true,
            created_at: now,
            updated_at: now,
        }])
        .await;

    let values = manager
        .read("diagslave", RegisterType::Holding, address, count)
        .await
        .expect("read");

    assert_eq!(values.len(), count as usize);
}

fn env_u16(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
