#![allow(dead_code)]

pub mod cache;
pub mod device;
pub mod error;
pub mod metrics;
pub mod polling;
pub mod register;

pub use cache::{CacheEntry, CacheValue};
pub use device::{DeviceConfig, GatewayKey};
pub use error::{ApiErrorKind, ErrorBody};
pub use metrics::MetricsSnapshot;
pub use polling::PollingTarget;
pub use register::{Framer, RegisterType};
