pub mod admin;
pub mod devices;
pub mod error;
pub mod observability;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Builds the full HTTP surface: device data plane under `/api/devices`,
/// admin CRUD under `/api/admin`, observability endpoints at top level.
pub fn build_router(state: AppState) -> Router {
    let device_routes = Router::new()
        .route("/", get(devices::list_devices))
        .route("/gateways", get(devices::list_gateways))
        .route("/:device_id/registers", get(devices::read_registers))
        .route("/:device_id/registers/write", post(devices::write_register));

    let admin_device_routes = Router::new()
        .route("/", get(admin::list_devices).post(admin::create_device))
        .route("/reload", post(admin::reload_devices))
        .route(
            "/:device_id",
            get(admin::get_device).put(admin::update_device).delete(admin::delete_device),
        )
        .route("/:device_id/activate", post(admin::activate_device));

    let admin_polling_routes = Router::new()
        .route("/", get(admin::list_polling_targets).post(admin::create_polling_target))
        .route("/active", get(admin::list_active_polling_targets))
        .route("/device/:device_id", get(admin::list_polling_targets_for_device))
        .route(
            "/:id",
            get(admin::get_polling_target)
                .put(admin::update_polling_target)
                .delete(admin::delete_polling_target),
        )
        .route("/:id/activate", post(admin::activate_polling_target));

    let admin_cache_routes = Router::new()
        .route("/", get(admin::list_cache_keys).delete(admin::clear_cache))
        .route("/stats", get(admin::cache_stats))
        .route("/device/:device_id", get(admin::cache_keys_for_device));

    let admin_routes = Router::new()
        .nest("/devices", admin_device_routes)
        .nest("/polling", admin_polling_routes)
        .nest("/cache", admin_cache_routes);

    Router::new()
        .nest("/api/devices", device_routes)
        .nest("/api/admin", admin_routes)
        .route("/health", get(observability::health))
        .route("/api/metrics", get(observability::metrics))
        .route("/api/metrics/reset", post(observability::reset_metrics))
        .route("/api/metrics/prometheus", get(observability::metrics_prometheus))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
