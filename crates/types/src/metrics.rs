use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time read of every ambient counter the runtime tracks.
///
/// This is the plain-data shape handed back over `/api/metrics`; the
/// atomic counters that back it live in the telemetry crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub modbus_requests_total: u64,
    pub modbus_requests_success: u64,
    pub modbus_requests_failed: u64,
    pub modbus_latency_p50_ms: f64,
    pub modbus_latency_p95_ms: f64,
    pub modbus_latency_p99_ms: f64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_sets: u64,
    pub cache_evictions: u64,

    pub polling_cycles_completed: u64,
    pub polling_targets_success: u64,
    pub polling_targets_failed: u64,
    pub last_cycle_duration_ms: Option<u64>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_ratio_handles_no_traffic() {
        assert_eq!(MetricsSnapshot::default().cache_hit_ratio(), 0.0);
    }

    #[test]
    fn hit_ratio_computes() {
        let snapshot = MetricsSnapshot {
            cache_hits: 3,
            cache_misses: 1,
            ..Default::default()
        };
        assert_eq!(snapshot.cache_hit_ratio(), 0.75);
    }
}
