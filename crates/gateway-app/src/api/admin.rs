use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use cache::CacheStatsSnapshot;
use types::{ApiErrorKind, DeviceConfig, Framer, PollingTarget, RegisterType};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub timeout_seconds: u32,
    pub framer: Framer,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
}

fn into_device(request: CreateDeviceRequest, now: chrono::DateTime<Utc>) -> DeviceConfig {
    DeviceConfig {
        device_id: request.device_id,
        host: request.host,
        port: request.port,
        slave_id: request.slave_id,
        timeout_seconds: request.timeout_seconds,
        framer: request.framer,
        max_retries: request.max_retries,
        retry_delay_seconds: request.retry_delay_seconds,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub async fn create_device(
    State(state): State<AppState>,
    Json(request): Json<CreateDeviceRequest>,
) -> ApiResult<Json<DeviceConfig>> {
    let device = into_device(request, Utc::now());
    device.validate()?;
    state.store.create_device(&device).await?;
    reload_manager(&state).await?;
    Ok(Json(device))
}

pub async fn list_devices(State(state): State<AppState>) -> ApiResult<Json<Vec<DeviceConfig>>> {
    let devices = state.store.list_devices(false).await?;
    Ok(Json(devices))
}

pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<DeviceConfig>> {
    let device = state
        .store
        .get_device(&device_id)
        .await?
        .ok_or_else(|| ApiErrorKind::not_found(format!("device '{device_id}' not found")))?;
    Ok(Json(device))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeviceRequest {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub timeout_seconds: u32,
    pub framer: Framer,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
    pub is_active: bool,
}

pub async fn update_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<UpdateDeviceRequest>,
) -> ApiResult<Json<DeviceConfig>> {
    let existing = state
        .store
        .get_device(&device_id)
        .await?
        .ok_or_else(|| ApiErrorKind::not_found(format!("device '{device_id}' not found")))?;

    let device = DeviceConfig {
        device_id: device_id.clone(),
        host: request.host,
        port: request.port,
        slave_id: request.slave_id,
        timeout_seconds: request.timeout_seconds,
        framer: request.framer,
        max_retries: request.max_retries,
        retry_delay_seconds: request.retry_delay_seconds,
        is_active: request.is_active,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    device.validate()?;
    state.store.update_device(&device).await?;
    reload_manager(&state).await?;
    Ok(Json(device))
}

pub async fn delete_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.delete_device(&device_id).await?;
    reload_manager(&state).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn activate_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<DeviceConfig>> {
    let mut device = state
        .store
        .get_device(&device_id)
        .await?
        .ok_or_else(|| ApiErrorKind::not_found(format!("device '{device_id}' not found")))?;
    device.is_active = true;
    device.updated_at = Utc::now();
    state.store.update_device(&device).await?;
    reload_manager(&state).await?;
    Ok(Json(device))
}

pub async fn reload_devices(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let count = reload_manager(&state).await?;
    Ok(Json(serde_json::json!({ "ok": true, "device_count": count })))
}

async fn reload_manager(state: &AppState) -> Result<usize, ApiError> {
    let devices = state.store.list_devices(true).await?;
    let count = devices.len();
    state.manager.reload(devices).await;
    Ok(count)
}

#[derive(Debug, Deserialize)]
pub struct CreatePollingTargetRequest {
    pub device_id: String,
    pub register_type: RegisterType,
    pub address: u16,
    pub count: u16,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_polling_target(
    State(state): State<AppState>,
    Json(request): Json<CreatePollingTargetRequest>,
) -> ApiResult<Json<PollingTarget>> {
    let now = Utc::now();
    let mut target = PollingTarget {
        id: 0,
        device_id: request.device_id,
        register_type: request.register_type,
        address: request.address,
        count: request.count,
        is_active: true,
        description: request.description,
        created_at: now,
        updated_at: now,
    };
    target.validate()?;
    target.id = state.store.create_polling_target(&target).await?;
    Ok(Json(target))
}

pub async fn list_polling_targets(State(state): State<AppState>) -> ApiResult<Json<Vec<PollingTarget>>> {
    let targets = state.store.list_polling_targets(false).await?;
    Ok(Json(targets))
}

pub async fn list_active_polling_targets(State(state): State<AppState>) -> ApiResult<Json<Vec<PollingTarget>>> {
    let targets = state.store.list_polling_targets(true).await?;
    Ok(Json(targets))
}

pub async fn list_polling_targets_for_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Vec<PollingTarget>>> {
    let targets = state.store.list_polling_targets_for_device(&device_id).await?;
    Ok(Json(targets))
}

pub async fn get_polling_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PollingTarget>> {
    let target = state
        .store
        .get_polling_target(id)
        .await?
        .ok_or_else(|| ApiErrorKind::not_found(format!("polling target {id} not found")))?;
    Ok(Json(target))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePollingTargetRequest {
    pub device_id: String,
    pub register_type: RegisterType,
    pub address: u16,
    pub count: u16,
    pub is_active: bool,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn update_polling_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePollingTargetRequest>,
) -> ApiResult<Json<PollingTarget>> {
    let existing = state
        .store
        .get_polling_target(id)
        .await?
        .ok_or_else(|| ApiErrorKind::not_found(format!("polling target {id} not found")))?;

    let target = PollingTarget {
        id,
        device_id: request.device_id,
        register_type: request.register_type,
        address: request.address,
        count: request.count,
        is_active: request.is_active,
        description: request.description,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    target.validate()?;
    state.store.update_polling_target(&target).await?;
    Ok(Json(target))
}

pub async fn delete_polling_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.delete_polling_target(id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn activate_polling_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PollingTarget>> {
    let mut target = state
        .store
        .get_polling_target(id)
        .await?
        .ok_or_else(|| ApiErrorKind::not_found(format!("polling target {id} not found")))?;
    target.is_active = true;
    target.updated_at = Utc::now();
    state.store.update_polling_target(&target).await?;
    Ok(Json(target))
}

pub async fn list_cache_keys(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.cache.keys().await)
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsSnapshot> {
    Json(state.cache.stats())
}

pub async fn cache_keys_for_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Json<Vec<String>> {
    Json(state.cache.device_keys(&device_id).await)
}

pub async fn clear_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.cache.clear().await;
    Json(serde_json::json!({ "ok": true }))
}
