use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use types::{ApiErrorKind, CacheValue, RegisterType};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Per-call budget at the HTTP edge; independent of the per-device
/// per-attempt `timeout_seconds` the manager applies underneath.
const REQUEST_BUDGET: Duration = Duration::from_secs(5);

pub async fn list_devices(State(state): State<AppState>) -> Json<Vec<String>> {
    let mut ids: Vec<String> = state
        .manager
        .list_devices()
        .await
        .into_iter()
        .filter(|device| device.is_active)
        .map(|device| device.device_id)
        .collect();
    ids.sort();
    Json(ids)
}

#[derive(Debug, Serialize)]
pub struct GatewayStatusDto {
    pub host: String,
    pub port: u16,
    pub connected: bool,
    pub circuit_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

pub async fn list_gateways(State(state): State<AppState>) -> Json<Vec<GatewayStatusDto>> {
    let statuses = state.manager.list_gateways_with_status().await;
    let dtos = statuses
        .into_iter()
        .map(|status| GatewayStatusDto {
            host: status.key.host,
            port: status.key.port,
            connected: !status.circuit_open,
            circuit_state: if status.circuit_open { "open" } else { "closed" }.to_string(),
            retry_after_seconds: status.retry_after_seconds,
        })
        .collect();
    Json(dtos)
}

#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub address: u16,
    pub count: u16,
    pub register_type: RegisterType,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub device_id: String,
    pub register_type: RegisterType,
    pub address: u16,
    pub count: u16,
    pub values: serde_json::Value,
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

fn values_json(value: &CacheValue) -> serde_json::Value {
    match value {
        CacheValue::Registers(values) => serde_json::to_value(values).unwrap_or_default(),
        CacheValue::Bits(values) => serde_json::to_value(values).unwrap_or_default(),
    }
}

fn validate_read_query(query: &ReadQuery) -> Result<(), ApiErrorKind> {
    if query.count == 0 || query.count > query.register_type.max_count() {
        return Err(ApiErrorKind::validation(format!(
            "count must be 1-{} for {} registers",
            query.register_type.max_count(),
            query.register_type
        )));
    }
    let last_address = query.address as u32 + query.count as u32 - 1;
    if last_address > u16::MAX as u32 {
        return Err(ApiErrorKind::validation(
            "address + count overflows the 16-bit register space",
        ));
    }
    Ok(())
}

/// `source=live` always calls the manager under the HTTP edge's wall-clock
/// budget. `source=cache` consults the cache first; on a miss it falls
/// back to live and the response honestly reports `source: "live"`.
pub async fn read_registers(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> ApiResult<Json<ReadResponse>> {
    validate_read_query(&query)?;

    let want_cache = query.source.as_deref() == Some("cache");
    let cache_key = format!("{}:{}:{}:{}", device_id, query.register_type, query.address, query.count);

    if want_cache {
        if let Some(entry) = state.cache.get(&cache_key).await {
            return Ok(Json(ReadResponse {
                device_id,
                register_type: query.register_type,
                address: query.address,
                count: query.count,
                values: values_json(&entry.value),
                source: "cache",
                cached_at: Some(entry.cached_at),
            }));
        }
    }

    let read_start = std::time::Instant::now();
    let outcome = tokio::time::timeout(
        REQUEST_BUDGET,
        state
            .manager
            .read(&device_id, query.register_type, query.address, query.count),
    )
    .await;
    let elapsed_ms = read_start.elapsed().as_millis() as u64;

    let value = match outcome {
        Ok(Ok(value)) => {
            state.telemetry.record_modbus_request(true, elapsed_ms);
            value
        }
        Ok(Err(err)) => {
            state.telemetry.record_modbus_request(false, elapsed_ms);
            return Err(err.into());
        }
        Err(_) => {
            state.telemetry.record_modbus_request(false, elapsed_ms);
            let _ = state.manager.reset_gateway(&device_id).await;
            return Err(ApiError(ApiErrorKind::transport(
                "request budget exceeded",
                true,
            )));
        }
    };

    state.cache.set(cache_key, value.clone()).await;

    Ok(Json(ReadResponse {
        device_id,
        register_type: query.register_type,
        address: query.address,
        count: query.count,
        values: values_json(&value),
        source: "live",
        cached_at: None,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub address: u16,
    pub value: u16,
    pub register_type: RegisterType,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub ok: bool,
}

/// Writes are only permitted against `holding`/`coil` register spaces,
/// are always live, and invalidate the cache entry they touch on success
/// so a subsequent cached read doesn't serve a stale value.
pub async fn write_register(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(body): Json<WriteRequest>,
) -> ApiResult<Json<WriteResponse>> {
    if !body.register_type.is_writable() {
        return Err(ApiError(ApiErrorKind::validation(format!(
            "{} register space is not writable",
            body.register_type
        ))));
    }

    let write_start = std::time::Instant::now();
    let outcome = tokio::time::timeout(
        REQUEST_BUDGET,
        state
            .manager
            .write(&device_id, body.register_type, body.address, body.value),
    )
    .await;
    let elapsed_ms = write_start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(())) => state.telemetry.record_modbus_request(true, elapsed_ms),
        Ok(Err(err)) => {
            state.telemetry.record_modbus_request(false, elapsed_ms);
            return Err(err.into());
        }
        Err(_) => {
            state.telemetry.record_modbus_request(false, elapsed_ms);
            let _ = state.manager.reset_gateway(&device_id).await;
            return Err(ApiError(ApiErrorKind::transport(
                "request budget exceeded",
                true,
            )));
        }
    }

    let invalidate_prefix = format!("{}:{}:{}:", device_id, body.register_type, body.address);
    for key in state.cache.keys().await {
        if key.starts_with(&invalidate_prefix) {
            state.cache.invalidate(&key).await;
        }
    }

    Ok(Json(WriteResponse { ok: true }))
}
