use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use gateway_app::config::GatewayConfig;
use gateway_app::{bootstrap, shutdown, spawn_poller};
use store::Store;
use types::{DeviceConfig, Framer, PollingTarget, RegisterType};

#[tokio::test]
async fn bootstrap_loads_devices_and_poller_runs_one_cycle() {
    let db_path = temp_db_path("e2e-bootstrap");
    let database_url = format!("sqlite://{}", db_path.display());

    let seed_store = Store::connect(&database_url, false).await.expect("seed store");
    let now = Utc::now();
    seed_store
        .create_device(&DeviceConfig {
            device_id: "seeded-device".to_string(),
            host: "127.0.0.1".to_string(),
            port: 15999,
            slave_id: 1,
            timeout_seconds: 1,
            framer: Framer::Socket,
            max_retries: 0,
            retry_delay_seconds: 0.01,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("seed device");
    seed_store
        .create_polling_target(&PollingTarget {
            id: 0,
            device_id: "seeded-device".to_string(),
            register_type: RegisterType::Holding,
            address: 0,
            count: 2,
            is_active: true,
            description: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("seed polling target");

    let config = GatewayConfig {
        database_url,
        database_echo: false,
        mqtt_broker_host: None,
        mqtt_broker_port: 1883,
        mqtt_username: None,
        mqtt_password: None,
        mqtt_topic_prefix: "modbus/data".to_string(),
        poll_interval: Duration::from_millis(50),
        cache_ttl_seconds: 300,
        log_level: "info".to_string(),
        log_json: false,
        circuit_breaker_failure_threshold: 5,
        circuit_breaker_recovery_timeout: Duration::from_secs(30),
    };

    let runtime = bootstrap(&config).await.expect("bootstrap");
    assert_eq!(runtime.manager.list_devices().await.len(), 1);

    let poller_handle = spawn_poller(&runtime, config.poll_interval);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let snapshot = runtime.telemetry.snapshot(0, 0, 0, 0);
    assert!(snapshot.polling_cycles_completed >= 1);
    assert!(snapshot.modbus_requests_total >= 1);
    assert_eq!(snapshot.modbus_requests_success, 0, "unreachable gateway, reads must fail");

    shutdown(&runtime, &poller_handle).await;
    cleanup_db(&db_path);
}

fn temp_db_path(prefix: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let pid = std::process::id();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    path.push(format!("{prefix}-{pid}-{ts}.sqlite"));
    path
}

fn cleanup_db(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
    let wal = PathBuf::from(format!("{}-wal", path.display()));
    let shm = PathBuf::from(format!("{}-shm", path.display()));
    let _ = std::fs::remove_file(wal);
    let _ = std::fs::remove_file(shm);
}
