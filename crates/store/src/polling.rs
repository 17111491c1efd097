use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use types::{PollingTarget, RegisterType};

pub async fn create(pool: &SqlitePool, target: &PollingTarget) -> Result<i64, StoreError> {
    let result = sqlx::query(
        "INSERT INTO polling_targets \
            (device_id, register_type, address, count, is_active, description, \
             created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&target.device_id)
    .bind(target.register_type.to_string())
    .bind(target.address as i64)
    .bind(target.count as i64)
    .bind(target.is_active)
    .bind(&target.description)
    .bind(target.created_at.to_rfc3339())
    .bind(target.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<PollingTarget>, StoreError> {
    let row = sqlx::query("SELECT * FROM polling_targets WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row_to_target(&row)))
}

/// Ordered by `id` to preserve the stable within-gateway read order the
/// poller relies on.
pub async fn list(pool: &SqlitePool, active_only: bool) -> Result<Vec<PollingTarget>, StoreError> {
    let query = if active_only {
        "SELECT * FROM polling_targets WHERE is_active = 1 ORDER BY id"
    } else {
        "SELECT * FROM polling_targets ORDER BY id"
    };
    let rows = sqlx::query(query).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_target).collect())
}

pub async fn list_by_device(pool: &SqlitePool, device_id: &str) -> Result<Vec<PollingTarget>, StoreError> {
    let rows = sqlx::query("SELECT * FROM polling_targets WHERE device_id = ? ORDER BY id")
        .bind(device_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_target).collect())
}

pub async fn update(pool: &SqlitePool, target: &PollingTarget) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE polling_targets SET \
            device_id = ?, register_type = ?, address = ?, count = ?, \
            is_active = ?, description = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&target.device_id)
    .bind(target.register_type.to_string())
    .bind(target.address as i64)
    .bind(target.count as i64)
    .bind(target.is_active)
    .bind(&target.description)
    .bind(Utc::now().to_rfc3339())
    .bind(target.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!(
            "polling target {} not found",
            target.id
        )));
    }
    Ok(())
}

/// Soft delete: `is_active = false`, row persists for audit.
pub async fn soft_delete(pool: &SqlitePool, id: i64) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE polling_targets SET is_active = 0, updated_at = ? WHERE id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("polling target {id} not found")));
    }
    Ok(())
}

fn row_to_target(row: &sqlx::sqlite::SqliteRow) -> PollingTarget {
    PollingTarget {
        id: row.get::<i64, _>("id"),
        device_id: row.get::<String, _>("device_id"),
        register_type: row
            .get::<String, _>("register_type")
            .parse::<RegisterType>()
            .unwrap_or(RegisterType::Holding),
        address: row.get::<i64, _>("address") as u16,
        count: row.get::<i64, _>("count") as u16,
        is_active: row.get::<bool, _>("is_active"),
        description: row.get::<Option<String>, _>("description"),
        created_at: parse_timestamp(row.get::<String, _>("created_at")),
        updated_at: parse_timestamp(row.get::<String, _>("updated_at")),
    }
}

fn parse_timestamp(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
