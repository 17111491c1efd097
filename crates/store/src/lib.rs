#![allow(dead_code)]

mod devices;
mod error;
mod polling;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub use error::StoreError;
use types::{DeviceConfig, PollingTarget};

/// sqlx/SQLite-backed CRUD for `modbus_devices` and `polling_targets`.
/// Both the admin API and the poller's hot reload read through this.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str, echo: bool) -> Result<Self, StoreError> {
        let level = if echo { log::LevelFilter::Debug } else { log::LevelFilter::Off };
        let options: SqliteConnectOptions = database_url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .log_statements(level);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL;").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL;").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys = ON;").execute(&pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS modbus_devices (\
                device_id TEXT PRIMARY KEY,\
                host TEXT NOT NULL,\
                port INTEGER NOT NULL,\
                slave_id INTEGER NOT NULL,\
                timeout_seconds INTEGER NOT NULL,\
                framer TEXT NOT NULL,\
                max_retries INTEGER NOT NULL,\
                retry_delay_seconds REAL NOT NULL,\
                is_active INTEGER NOT NULL DEFAULT 1,\
                created_at TEXT NOT NULL,\
                updated_at TEXT NOT NULL\
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS polling_targets (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                device_id TEXT NOT NULL,\
                register_type TEXT NOT NULL,\
                address INTEGER NOT NULL,\
                count INTEGER NOT NULL,\
                is_active INTEGER NOT NULL DEFAULT 1,\
                description TEXT,\
                created_at TEXT NOT NULL,\
                updated_at TEXT NOT NULL\
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_polling_targets_device_id ON polling_targets(device_id)",
        )
        .execute(&pool)
        .await?;

        info!(database_url, "store initialized");

        Ok(Self { pool })
    }

    pub async fn create_device(&self, device: &DeviceConfig) -> Result<(), StoreError> {
        devices::create(&self.pool, device).await
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Option<DeviceConfig>, StoreError> {
        devices::get(&self.pool, device_id).await
    }

    pub async fn list_devices(&self, active_only: bool) -> Result<Vec<DeviceConfig>, StoreError> {
        devices::list(&self.pool, active_only).await
    }

    pub async fn update_device(&self, device: &DeviceConfig) -> Result<(), StoreError> {
        devices::update(&self.pool, device).await
    }

    pub async fn delete_device(&self, device_id: &str) -> Result<(), StoreError> {
        devices::soft_delete(&self.pool, device_id).await
    }

    pub async fn create_polling_target(&self, target: &PollingTarget) -> Result<i64, StoreError> {
        polling::create(&self.pool, target).await
    }

    pub async fn get_polling_target(&self, id: i64) -> Result<Option<PollingTarget>, StoreError> {
        polling::get(&self.pool, id).await
    }

    pub async fn list_polling_targets(&self, active_only: bool) -> Result<Vec<PollingTarget>, StoreError> {
        polling::list(&self.pool, active_only).await
    }

    pub async fn list_polling_targets_for_device(&self, device_id: &str) -> Result<Vec<PollingTarget>, StoreError> {
        polling::list_by_device(&self.pool, device_id).await
    }

    pub async fn update_polling_target(&self, target: &PollingTarget) -> Result<(), StoreError> {
        polling::update(&self.pool, target).await
    }

    pub async fn delete_polling_target(&self, id: i64) -> Result<(), StoreError> {
        polling::soft_delete(&self.pool, id).await
    }
}
