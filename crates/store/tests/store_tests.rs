use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use store::Store;
use types::{DeviceConfig, Framer, PollingTarget, RegisterType};

fn device(id: &str) -> DeviceConfig {
    let now = Utc::now();
    DeviceConfig {
        device_id: id.to_string(),
        host: "10.0.0.5".to_string(),
        port: 502,
        slave_id: 1,
        timeout_seconds: 5,
        framer: Framer::Socket,
        max_retries: 3,
        retry_delay_seconds: 0.1,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn target(device_id: &str) -> PollingTarget {
    let now = Utc::now();
    PollingTarget {
        id: 0,
        device_id: device_id.to_string(),
        register_type: RegisterType::Holding,
        address: 0,
        count: 5,
        is_active: true,
        description: Some("test target".to_string()),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn device_crud_round_trips() {
    let path = temp_db_path("device_crud");
    let store = Store::connect(&sqlite_url(&path), false).await.expect("init");

    store.create_device(&device("d1")).await.expect("create");
    let fetched = store.get_device("d1").await.expect("get").expect("present");
    assert_eq!(fetched.host, "10.0.0.5");

    let mut updated = fetched.clone();
    updated.host = "10.0.0.9".to_string();
    store.update_device(&updated).await.expect("update");
    let refetched = store.get_device("d1").await.expect("get").expect("present");
    assert_eq!(refetched.host, "10.0.0.9");

    store.delete_device("d1").await.expect("soft delete");
    let soft_deleted = store.get_device("d1").await.expect("get").expect("present");
    assert!(!soft_deleted.is_active);

    let active = store.list_devices(true).await.expect("list active");
    assert!(active.is_empty());
    let all = store.list_devices(false).await.expect("list all");
    assert_eq!(all.len(), 1);

    cleanup_db(&path);
}

#[tokio::test]
async fn creating_duplicate_device_id_conflicts() {
    let path = temp_db_path("device_conflict");
    let store = Store::connect(&sqlite_url(&path), false).await.expect("init");

    store.create_device(&device("d1")).await.expect("create");
    let err = store.create_device(&device("d1")).await;
    assert!(err.is_err());

    cleanup_db(&path);
}

#[tokio::test]
async fn polling_target_crud_round_trips() {
    let path = temp_db_path("polling_crud");
    let store = Store::connect(&sqlite_url(&path), false).await.expect("init");

    store.create_device(&device("d1")).await.expect("create device");
    let id = store.create_polling_target(&target("d1")).await.expect("create target");

    let fetched = store.get_polling_target(id).await.expect("get").expect("present");
    assert_eq!(fetched.device_id, "d1");
    assert_eq!(fetched.count, 5);

    let mut updated = fetched.clone();
    updated.count = 10;
    store.update_polling_target(&updated).await.expect("update");
    let refetched = store.get_polling_target(id).await.expect("get").expect("present");
    assert_eq!(refetched.count, 10);

    let for_device = store.list_polling_targets_for_device("d1").await.expect("list by device");
    assert_eq!(for_device.len(), 1);

    store.delete_polling_target(id).await.expect("soft delete");
    let active = store.list_polling_targets(true).await.expect("list active");
    assert!(active.is_empty());

    cleanup_db(&path);
}

fn sqlite_url(path: &PathBuf) -> String {
    format!("sqlite://{}", path.display())
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
