use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::GatewayError;
use crate::gateway::{Gateway, RequestPolicy};
use types::{CacheValue, DeviceConfig, GatewayKey, RegisterType};

/// Status snapshot of one gateway, for `list_gateways_with_status`.
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub key: GatewayKey,
    pub circuit_open: bool,
    pub retry_after_seconds: Option<u64>,
    pub device_count: usize,
}

/// Owns the device map and the gateway map. Devices are resolved to a
/// gateway by (host, port); gateways are created lazily and dropped when
/// `reload` removes the last device that referenced them.
pub struct ModbusManager {
    devices: RwLock<Arc<HashMap<String, DeviceConfig>>>,
    gateways: RwLock<HashMap<GatewayKey, Arc<Gateway>>>,
    circuit_failure_threshold: u32,
    circuit_recovery_timeout: Duration,
}

impl ModbusManager {
    pub fn new() -> Self {
        Self::with_circuit_breaker_config(5, Duration::from_secs(30))
    }

    pub fn with_circuit_breaker_config(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            devices: RwLock::new(Arc::new(HashMap::new())),
            gateways: RwLock::new(HashMap::new()),
            circuit_failure_threshold: failure_threshold,
            circuit_recovery_timeout: recovery_timeout,
        }
    }

    /// Copy-on-write swap of the device map. Closes and drops gateways no
    /// longer referenced by any device in `new_configs`; leaves gateways
    /// still in use untouched so in-flight requests aren't disrupted.
    pub async fn reload(&self, new_configs: Vec<DeviceConfig>) {
        let mut next = HashMap::with_capacity(new_configs.len());
        let mut live_keys = std::collections::HashSet::new();
        for config in new_configs {
            live_keys.insert(config.gateway_key());
            next.insert(config.device_id.clone(), config);
        }

        {
            let mut devices = self.devices.write().await;
            *devices = Arc::new(next);
        }

        let mut stale = Vec::new();
        {
            let gateways = self.gateways.read().await;
            for key in gateways.keys() {
                if !live_keys.contains(key) {
                    stale.push(key.clone());
                }
            }
        }

        if stale.is_empty() {
            return;
        }

        let mut gateways = self.gateways.write().await;
        for key in stale {
            if let Some(gateway) = gateways.remove(&key) {
                gateway.close().await;
                info!(gateway = %key, "closed unused gateway on reload");
            }
        }
    }

    pub async fn list_devices(&self) -> Vec<DeviceConfig> {
        let devices = self.devices.read().await.clone();
        devices.values().cloned().collect()
    }

    pub async fn get_device(&self, device_id: &str) -> Option<DeviceConfig> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn list_gateways_with_status(&self) -> Vec<GatewayStatus> {
        let devices = self.devices.read().await.clone();
        let mut counts: HashMap<GatewayKey, usize> = HashMap::new();
        for device in devices.values() {
            *counts.entry(device.gateway_key()).or_insert(0) += 1;
        }

        let gateways = self.gateways.read().await;
        let mut out = Vec::with_capacity(gateways.len());
        for (key, gateway) in gateways.iter() {
            out.push(GatewayStatus {
                key: key.clone(),
                circuit_open: gateway.is_circuit_open().await,
                retry_after_seconds: gateway.circuit_retry_after_seconds().await,
                device_count: counts.get(key).copied().unwrap_or(0),
            });
        }
        out
    }

    /// Closes every known gateway's transport. Used during process
    /// shutdown; the gateway map itself is left intact so fresh requests
    /// during a slow shutdown just reconnect on demand.
    pub async fn close_all(&self) {
        let gateways = self.gateways.read().await;
        for gateway in gateways.values() {
            gateway.close().await;
        }
    }

    /// Closes the transport backing `device_id`'s gateway, forcing a fresh
    /// connection on the next request. Used when a request blows through
    /// its budget, since a stuck transport otherwise keeps serializing
    /// every later request behind the hung one. Only closes a gateway
    /// already in the map; never creates one.
    pub async fn reset_gateway(&self, device_id: &str) -> Result<(), GatewayError> {
        let device = self
            .get_device(device_id)
            .await
            .ok_or_else(|| GatewayError::UnknownDevice(device_id.to_string()))?;
        let key = device.gateway_key();
        let gateways = self.gateways.read().await;
        if let Some(gateway) = gateways.get(&key) {
            gateway.close().await;
            info!(gateway = %key, device_id, "reset gateway after request budget exceeded");
        }
        Ok(())
    }

    async fn gateway_for(&self, device: &DeviceConfig) -> Arc<Gateway> {
        let key = device.gateway_key();
        {
            let gateways = self.gateways.read().await;
            if let Some(gateway) = gateways.get(&key) {
                return gateway.clone();
            }
        }
        let mut gateways = self.gateways.write().await;
        let failure_threshold = self.circuit_failure_threshold;
        let recovery_timeout = self.circuit_recovery_timeout;
        gateways
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Gateway::new(
                    device.host.clone(),
                    device.port,
                    device.framer,
                    failure_threshold,
                    recovery_timeout,
                ))
            })
            .clone()
    }

    fn policy_for(device: &DeviceConfig) -> RequestPolicy {
        RequestPolicy {
            timeout: Duration::from_secs(device.timeout_seconds as u64),
            max_retries: device.max_retries,
            retry_delay: Duration::from_secs_f64(device.retry_delay_seconds),
        }
    }

    pub async fn read(
        &self,
        device_id: &str,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> Result<CacheValue, GatewayError> {
        let device = self
            .get_device(device_id)
            .await
            .ok_or_else(|| GatewayError::UnknownDevice(device_id.to_string()))?;
        let gateway = self.gateway_for(&device).await;
        gateway
            .read(
                device.slave_id,
                register_type,
                address,
                count,
                Self::policy_for(&device),
            )
            .await
    }

    pub async fn write(
        &self,
        device_id: &str,
        register_type: RegisterType,
        address: u16,
        value: u16,
    ) -> Result<(), GatewayError> {
        let device = self
            .get_device(device_id)
            .await
            .ok_or_else(|| GatewayError::UnknownDevice(device_id.to_string()))?;
        let gateway = self.gateway_for(&device).await;
        gateway
            .write(
                device.slave_id,
                register_type,
                address,
                value,
                Self::policy_for(&device),
            )
            .await
    }
}

impl Default for ModbusManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn device(id: &str, host: &str, port: u16) -> DeviceConfig {
        DeviceConfig {
            device_id: id.to_string(),
            host: host.to_string(),
            port,
            slave_id: 1,
            timeout_seconds: 1,
            framer: types::Framer::Socket,
            max_retries: 0,
            retry_delay_seconds: 0.01,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reload_drops_unreferenced_gateway() {
        let manager = ModbusManager::new();
        manager
            .reload(vec![device("d1", "127.0.0.1", 15020), device("d2", "127.0.0.1", 15021)])
            .await;

        // force both gateways into existence
        let d1 = manager.get_device("d1").await.unwrap();
        let d2 = manager.get_device("d2").await.unwrap();
        manager.gateway_for(&d1).await;
        manager.gateway_for(&d2).await;
        assert_eq!(manager.gateways.read().await.len(), 2);

        manager.reload(vec![device("d1", "127.0.0.1", 15020)]).await;
        assert_eq!(manager.gateways.read().await.len(), 1);
        assert!(manager.get_device("d2").await.is_none());
    }

    #[tokio::test]
    async fn unknown_device_is_reported() {
        let manager = ModbusManager::new();
        let err = manager.read("missing", RegisterType::Holding, 0, 1).await;
        assert!(matches!(err, Err(GatewayError::UnknownDevice(_))));
    }
}
