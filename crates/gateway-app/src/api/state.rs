use std::sync::Arc;

use cache::TtlCache;
use metrics_exporter_prometheus::PrometheusHandle;
use modbus_client::ModbusManager;
use mqtt_publisher::Publisher;
use store::Store;
use telemetry::Telemetry;

use crate::Runtime;

/// Shared axum state. Cloning is cheap: every field is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ModbusManager>,
    pub cache: Arc<TtlCache>,
    pub store: Arc<Store>,
    pub publisher: Arc<Publisher>,
    pub telemetry: Arc<Telemetry>,
    pub prometheus_handle: Option<PrometheusHandle>,
}

impl From<&Runtime> for AppState {
    fn from(runtime: &Runtime) -> Self {
        Self {
            manager: runtime.manager.clone(),
            cache: runtime.cache.clone(),
            store: runtime.store.clone(),
            publisher: runtime.publisher.clone(),
            telemetry: runtime.telemetry.clone(),
            prometheus_handle: runtime.prometheus_handle.clone(),
        }
    }
}
