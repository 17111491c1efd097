pub mod api;
pub mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

use cache::TtlCache;
use config::GatewayConfig;
use modbus_client::ModbusManager;
use mqtt_publisher::{MqttConfig, Publisher};
use poller::{Poller, PollerHandle};
use store::Store;
use telemetry::Telemetry;

/// Every long-lived singleton the HTTP surface and the poller share.
/// Built once in `bootstrap`, then handed to axum as state and to the
/// poller as its dependencies.
pub struct Runtime {
    pub manager: Arc<ModbusManager>,
    pub cache: Arc<TtlCache>,
    pub store: Arc<Store>,
    pub publisher: Arc<Publisher>,
    pub telemetry: Arc<Telemetry>,
    pub prometheus_handle: Option<PrometheusHandle>,
}

/// Connects the store, loads the device map into the manager, connects
/// MQTT (or no-ops if unconfigured), and installs the Prometheus
/// recorder. Does not start the poller; callers decide when to spawn it
/// so tests can build a `Runtime` without a background task running.
pub async fn bootstrap(config: &GatewayConfig) -> Result<Runtime> {
    let store = Store::connect(&config.database_url, config.database_echo)
        .await
        .context("connect to store")?;
    let store = Arc::new(store);

    let manager = Arc::new(ModbusManager::with_circuit_breaker_config(
        config.circuit_breaker_failure_threshold,
        config.circuit_breaker_recovery_timeout,
    ));
    let devices = store.list_devices(true).await.context("load devices")?;
    info!(count = devices.len(), "loaded active devices");
    manager.reload(devices).await;

    let cache = Arc::new(TtlCache::new(config.cache_ttl_seconds));

    let mqtt_config = MqttConfig {
        broker_host: config.mqtt_broker_host.clone(),
        port: config.mqtt_broker_port,
        client_id: format!("modbus-gateway-{}", std::process::id()),
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        topic_prefix: config.mqtt_topic_prefix.clone(),
        qos: 0,
        keep_alive: Duration::from_secs(30),
    };
    let publisher = Arc::new(Publisher::connect(mqtt_config));

    let telemetry = Arc::new(Telemetry::new());
    let prometheus_handle = telemetry::install_prometheus_exporter();

    Ok(Runtime {
        manager,
        cache,
        store,
        publisher,
        telemetry,
        prometheus_handle,
    })
}

/// Spawns the poller against an already-built `Runtime`.
pub fn spawn_poller(runtime: &Runtime, poll_interval: Duration) -> PollerHandle {
    let poller = Poller::new(
        runtime.manager.clone(),
        runtime.cache.clone(),
        runtime.store.clone(),
        runtime.publisher.clone(),
        runtime.telemetry.clone(),
        poll_interval,
    );
    poller.spawn()
}

/// Stops the poller, closes every gateway, then lets the MQTT background
/// task wind down on its own — mirroring the ordering the process relies
/// on during shutdown: poller first, then transports, then MQTT.
pub async fn shutdown(runtime: &Runtime, poller_handle: &PollerHandle) {
    poller_handle.stop();
    runtime.manager.close_all().await;
    info!("gateways closed, mqtt task left to drain on its own");
    warn!("shutdown sequence complete");
}
