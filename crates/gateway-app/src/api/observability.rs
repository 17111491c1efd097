use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{extract::State, Json};
use serde::Serialize;

use types::MetricsSnapshot;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub mqtt: bool,
    pub manager: bool,
}

/// 200 only when the database answers, MQTT is either unconfigured or
/// holds a live connection, and no gateway's circuit breaker is open. Any
/// one of those failing degrades the whole response, since a caller
/// polling `/health` needs to know the gateway can actually serve reads.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database_ok = state.store.list_devices(false).await.is_ok();
    let mqtt_ok = !state.publisher.is_enabled() || state.publisher.is_connected();
    let gateways = state.manager.list_gateways_with_status().await;
    let manager_ok = gateways.iter().all(|gateway| !gateway.circuit_open);
    let healthy = database_ok && mqtt_ok && manager_ok;

    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        database: database_ok,
        mqtt: mqtt_ok,
        manager: manager_ok,
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    let cache_stats = state.cache.stats();
    let snapshot = state.telemetry.snapshot(
        cache_stats.hits,
        cache_stats.misses,
        cache_stats.sets,
        cache_stats.evictions,
    );
    Json(snapshot)
}

pub async fn reset_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.telemetry.reset();
    Json(serde_json::json!({ "ok": true }))
}

/// Renders the ambient Prometheus scrape surface. Absent if the recorder
/// failed to install at startup.
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus_handle {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
