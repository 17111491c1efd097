use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use types::{DeviceConfig, Framer};

pub async fn create(pool: &SqlitePool, device: &DeviceConfig) -> Result<(), StoreError> {
    let existing = get(pool, &device.device_id).await?;
    if existing.is_some() {
        return Err(StoreError::Conflict(format!(
            "device_id '{}' already exists",
            device.device_id
        )));
    }

    sqlx::query(
        "INSERT INTO modbus_devices \
            (device_id, host, port, slave_id, timeout_seconds, framer, max_retries, \
             retry_delay_seconds, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&device.device_id)
    .bind(&device.host)
    .bind(device.port as i64)
    .bind(device.slave_id as i64)
    .bind(device.timeout_seconds as i64)
    .bind(device.framer.to_string())
    .bind(device.max_retries as i64)
    .bind(device.retry_delay_seconds)
    .bind(device.is_active)
    .bind(device.created_at.to_rfc3339())
    .bind(device.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get(pool: &SqlitePool, device_id: &str) -> Result<Option<DeviceConfig>, StoreError> {
    let row = sqlx::query("SELECT * FROM modbus_devices WHERE device_id = ?")
        .bind(device_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row_to_device(&row)))
}

pub async fn list(pool: &SqlitePool, active_only: bool) -> Result<Vec<DeviceConfig>, StoreError> {
    let query = if active_only {
        "SELECT * FROM modbus_devices WHERE is_active = 1 ORDER BY device_id"
    } else {
        "SELECT * FROM modbus_devices ORDER BY device_id"
    };
    let rows = sqlx::query(query).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_device).collect())
}

pub async fn update(pool: &SqlitePool, device: &DeviceConfig) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE modbus_devices SET \
            host = ?, port = ?, slave_id = ?, timeout_seconds = ?, framer = ?, \
            max_retries = ?, retry_delay_seconds = ?, is_active = ?, updated_at = ? \
         WHERE device_id = ?",
    )
    .bind(&device.host)
    .bind(device.port as i64)
    .bind(device.slave_id as i64)
    .bind(device.timeout_seconds as i64)
    .bind(device.framer.to_string())
    .bind(device.max_retries as i64)
    .bind(device.retry_delay_seconds)
    .bind(device.is_active)
    .bind(Utc::now().to_rfc3339())
    .bind(&device.device_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!(
            "device_id '{}' not found",
            device.device_id
        )));
    }
    Ok(())
}

/// Soft delete: `is_active = false`, row persists for audit.
pub async fn soft_delete(pool: &SqlitePool, device_id: &str) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE modbus_devices SET is_active = 0, updated_at = ? WHERE device_id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(device_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!(
            "device_id '{device_id}' not found"
        )));
    }
    Ok(())
}

fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> DeviceConfig {
    DeviceConfig {
        device_id: row.get::<String, _>("device_id"),
        host: row.get::<String, _>("host"),
        port: row.get::<i64, _>("port") as u16,
        slave_id: row.get::<i64, _>("slave_id") as u8,
        timeout_seconds: row.get::<i64, _>("timeout_seconds") as u32,
        framer: row
            .get::<String, _>("framer")
            .parse::<Framer>()
            .unwrap_or_default(),
        max_retries: row.get::<i64, _>("max_retries") as u32,
        retry_delay_seconds: row.get::<f64, _>("retry_delay_seconds"),
        is_active: row.get::<bool, _>("is_active"),
        created_at: parse_timestamp(row.get::<String, _>("created_at")),
        updated_at: parse_timestamp(row.get::<String, _>("updated_at")),
    }
}

fn parse_timestamp(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
