#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use cache::TtlCache;
use modbus_client::ModbusManager;
use mqtt_publisher::Publisher;
use store::Store;
use telemetry::Telemetry;
use types::{GatewayKey, PollingTarget};

/// Background polling scheduler. Hot-reloads active targets from the store
/// every tick; targets that share a gateway are read strictly in order,
/// targets on different gateways run concurrently.
pub struct Poller {
    manager: Arc<ModbusManager>,
    cache: Arc<TtlCache>,
    store: Arc<Store>,
    publisher: Arc<Publisher>,
    telemetry: Arc<Telemetry>,
    poll_interval: Duration,
}

/// Handle used to stop a running poller from elsewhere in the process,
/// e.g. the graceful shutdown sequence.
#[derive(Clone)]
pub struct PollerHandle {
    stop_tx: watch::Sender<bool>,
}

impl PollerHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Poller {
    pub fn new(
        manager: Arc<ModbusManager>,
        cache: Arc<TtlCache>,
        store: Arc<Store>,
        publisher: Arc<Publisher>,
        telemetry: Arc<Telemetry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            manager,
            cache,
            store,
            publisher,
            telemetry,
            poll_interval,
        }
    }

    /// Spawns the scheduler loop as a background task and returns a handle
    /// to stop it. If a cycle overruns `poll_interval`, the next cycle
    /// starts immediately with no overlap guard beyond that.
    pub fn spawn(self) -> PollerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = PollerHandle { stop_tx };

        tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }

                let cycle_start = Instant::now();
                let (succeeded, failed) = self.run_cycle().await;
                let duration = cycle_start.elapsed();

                self.telemetry.record_polling_cycle(
                    duration.as_millis() as u64,
                    succeeded,
                    failed,
                    Utc::now(),
                );
                debug!(
                    succeeded,
                    failed,
                    duration_ms = duration.as_millis() as u64,
                    "poll cycle complete"
                );

                let remaining = self.poll_interval.saturating_sub(duration);
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => {}
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("poller stopped");
        });

        handle
    }

    /// One tick: load active targets, group by gateway, run groups
    /// concurrently with sequential reads inside each group. A per-target
    /// failure is logged and counted, never propagated out of the cycle.
    async fn run_cycle(&self) -> (u64, u64) {
        let targets = match self.store.list_polling_targets(true).await {
            Ok(targets) => targets,
            Err(err) => {
                warn!(error = %err, "failed to load polling targets, skipping cycle");
                return (0, 0);
            }
        };

        let mut groups: HashMap<GatewayKey, Vec<PollingTarget>> = HashMap::new();
        let mut skipped = 0u64;

        for target in targets {
            let device = match self.manager.get_device(&target.device_id).await {
                Some(device) if device.is_active => device,
                Some(_) => {
                    debug!(device_id = %target.device_id, "skipping target, device inactive");
                    skipped += 1;
                    continue;
                }
                None => {
                    warn!(device_id = %target.device_id, "skipping target, device not found");
                    skipped += 1;
                    continue;
                }
            };
            groups.entry(device.gateway_key()).or_default().push(target);
        }

        let mut handles = Vec::with_capacity(groups.len());
        for (gateway_key, group_targets) in groups {
            let manager = self.manager.clone();
            let cache = self.cache.clone();
            let publisher = self.publisher.clone();
            let telemetry = self.telemetry.clone();
            handles.push(tokio::spawn(async move {
                run_group(gateway_key, group_targets, manager, cache, publisher, telemetry).await
            }));
        }

        let mut succeeded = 0u64;
        let mut failed = skipped;
        for handle in handles {
            match handle.await {
                Ok((group_ok, group_failed)) => {
                    succeeded += group_ok;
                    failed += group_failed;
                }
                Err(err) => {
                    warn!(error = %err, "poll group task panicked");
                    failed += 1;
                }
            }
        }

        (succeeded, failed)
    }
}

/// Targets sharing one gateway are read strictly in the order the DB
/// snapshot returned them (stable `id` order), preserving the per-gateway
/// serialization invariant devices on a shared RS-485 bus rely on.
async fn run_group(
    gateway_key: GatewayKey,
    targets: Vec<PollingTarget>,
    manager: Arc<ModbusManager>,
    cache: Arc<TtlCache>,
    publisher: Arc<Publisher>,
    telemetry: Arc<Telemetry>,
) -> (u64, u64) {
    let mut succeeded = 0u64;
    let mut failed = 0u64;

    for target in targets {
        let read_start = Instant::now();
        let result = manager
            .read(&target.device_id, target.register_type, target.address, target.count)
            .await;
        telemetry.record_modbus_request(result.is_ok(), read_start.elapsed().as_millis() as u64);

        match result {
            Ok(value) => {
                cache.set(target.cache_key(), value.clone()).await;
                let timestamp = Utc::now().timestamp() as f64;
                if let Err(err) = publisher
                    .publish(
                        &target.device_id,
                        target.register_type,
                        target.address,
                        target.count,
                        &value,
                        timestamp,
                    )
                    .await
                {
                    warn!(
                        gateway = %gateway_key,
                        device_id = %target.device_id,
                        error = %err,
                        "mqtt publish failed"
                    );
                }
                succeeded += 1;
            }
            Err(err) => {
                warn!(
                    gateway = %gateway_key,
                    device_id = %target.device_id,
                    address = target.address,
                    error = %err,
                    "poll read failed"
                );
                failed += 1;
            }
        }
    }

    (succeeded, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{DeviceConfig, Framer, RegisterType};

    fn device(id: &str, host: &str, port: u16) -> DeviceConfig {
        let now = Utc::now();
        DeviceConfig {
            device_id: id.to_string(),
            host: host.to_string(),
            port,
            slave_id: 1,
            timeout_seconds: 1,
            framer: Framer::Socket,
            max_retries: 0,
            retry_delay_seconds: 0.01,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn target(id: i64, device_id: &str) -> PollingTarget {
        let now = Utc::now();
        PollingTarget {
            id,
            device_id: device_id.to_string(),
            register_type: RegisterType::Holding,
            address: 0,
            count: 1,
            is_active: true,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn run_group_counts_failures_on_unreachable_device() {
        let manager = Arc::new(ModbusManager::new());
        manager.reload(vec![device("d1", "127.0.0.1", 1)]).await;
        let cache = Arc::new(TtlCache::new(60));
        let publisher = Arc::new(Publisher::new_noop());
        let telemetry = Arc::new(Telemetry::new());

        let (succeeded, failed) = run_group(
            GatewayKey { host: "127.0.0.1".to_string(), port: 1 },
            vec![target(1, "d1")],
            manager,
            cache,
            publisher,
            telemetry,
        )
        .await;

        assert_eq!(succeeded, 0);
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn unknown_device_is_never_grouped() {
        let manager = Arc::new(ModbusManager::new());
        assert!(manager.get_device("ghost").await.is_none());
    }
}
