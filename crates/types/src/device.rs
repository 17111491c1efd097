use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiErrorKind;
use crate::register::Framer;

pub const DEFAULT_TIMEOUT_SECONDS: u32 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECONDS: f64 = 0.1;

/// Identity and transport parameters for one Modbus unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub timeout_seconds: u32,
    pub framer: Framer,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceConfig {
    /// Canonical identifier of the physical connection this device shares
    /// with every other device pointed at the same (host, port).
    pub fn gateway_key(&self) -> GatewayKey {
        GatewayKey {
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn validate(&self) -> Result<(), ApiErrorKind> {
        let len = self.device_id.len();
        if len == 0 || len > 50 {
            return Err(ApiErrorKind::validation(
                "device_id must be 1-50 characters",
            ));
        }
        if self.host.trim().is_empty() {
            return Err(ApiErrorKind::validation("host must not be empty"));
        }
        if self.port == 0 {
            return Err(ApiErrorKind::validation("port must be 1-65535"));
        }
        if !(1..=247).contains(&self.slave_id) {
            return Err(ApiErrorKind::validation("slave_id must be 1-247"));
        }
        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(ApiErrorKind::validation("timeout_seconds must be 1-300"));
        }
        if self.max_retries > 10 {
            return Err(ApiErrorKind::validation("max_retries must be 0-10"));
        }
        if self.retry_delay_seconds < 0.0 {
            return Err(ApiErrorKind::validation(
                "retry_delay_seconds must be >= 0",
            ));
        }
        Ok(())
    }
}

/// Canonical identifier of a physical gateway connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GatewayKey {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for GatewayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_device() -> DeviceConfig {
        DeviceConfig {
            device_id: "d1".to_string(),
            host: "10.0.0.5".to_string(),
            port: 502,
            slave_id: 1,
            timeout_seconds: 10,
            framer: Framer::Socket,
            max_retries: 5,
            retry_delay_seconds: 0.1,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_valid_device() {
        assert!(valid_device().validate().is_ok());
    }

    #[test]
    fn rejects_slave_id_boundaries() {
        let mut device = valid_device();
        device.slave_id = 0;
        assert!(device.validate().is_err());
    }

    #[test]
    fn gateway_key_groups_by_host_port() {
        let device = valid_device();
        let mut other = valid_device();
        other.device_id = "d2".to_string();
        other.slave_id = 2;
        assert_eq!(device.gateway_key(), other.gateway_key());
    }
}
