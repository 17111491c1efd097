#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

use types::MetricsSnapshot;

const LATENCY_WINDOW: usize = 1000;

/// Ambient observability bridge: installs the global Prometheus recorder
/// once per process and hands back a handle `gateway-app` can render at
/// `/api/metrics/prometheus`.
pub fn install_prometheus_exporter() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "failed to install prometheus recorder");
            None
        }
    }
}

/// Atomic counters for the modbus/cache/polling metrics spec'd by
/// `MetricsSnapshot`, plus a bounded latency sample window for percentile
/// estimates. All increments are atomic so concurrent pollers and request
/// handlers never race on a shared lock for the hot path.
pub struct Telemetry {
    modbus_total: AtomicU64,
    modbus_success: AtomicU64,
    modbus_failed: AtomicU64,
    latency_samples_ms: Mutex<VecDeque<u64>>,

    polling_cycles: AtomicU64,
    polling_targets_success: AtomicU64,
    polling_targets_failed: AtomicU64,
    last_cycle_duration_ms: AtomicU64,
    last_cycle_at: Mutex<Option<DateTime<Utc>>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            modbus_total: AtomicU64::new(0),
            modbus_success: AtomicU64::new(0),
            modbus_failed: AtomicU64::new(0),
            latency_samples_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
            polling_cycles: AtomicU64::new(0),
            polling_targets_success: AtomicU64::new(0),
            polling_targets_failed: AtomicU64::new(0),
            last_cycle_duration_ms: AtomicU64::new(0),
            last_cycle_at: Mutex::new(None),
        }
    }

    pub fn record_modbus_request(&self, success: bool, latency_ms: u64) {
        self.modbus_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.modbus_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.modbus_failed.fetch_add(1, Ordering::Relaxed);
        }
        counter!("modbus_requests_total").increment(1);
        counter!(
            "modbus_requests_by_outcome",
            "outcome" => if success { "success" } else { "failed" }
        )
        .increment(1);
        histogram!("modbus_request_latency_ms").record(latency_ms as f64);

        let mut samples = self.latency_samples_ms.lock().expect("latency lock poisoned");
        if samples.len() == LATENCY_WINDOW {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    pub fn record_polling_cycle(&self, duration_ms: u64, succeeded: u64, failed: u64, at: DateTime<Utc>) {
        self.polling_cycles.fetch_add(1, Ordering::Relaxed);
        self.polling_targets_success.fetch_add(succeeded, Ordering::Relaxed);
        self.polling_targets_failed.fetch_add(failed, Ordering::Relaxed);
        self.last_cycle_duration_ms.store(duration_ms, Ordering::Relaxed);
        *self.last_cycle_at.lock().expect("cycle lock poisoned") = Some(at);

        counter!("polling_cycles_total").increment(1);
        counter!("polling_targets_success_total").increment(succeeded);
        counter!("polling_targets_failed_total").increment(failed);
        histogram!("polling_cycle_duration_ms").record(duration_ms as f64);
    }

    /// Merge in the cache counters the `cache` crate tracks itself, since
    /// they live alongside the cache table rather than being duplicated
    /// here, and produce the wire-format snapshot.
    pub fn snapshot(
        &self,
        cache_hits: u64,
        cache_misses: u64,
        cache_sets: u64,
        cache_evictions: u64,
    ) -> MetricsSnapshot {
        let samples = self.latency_samples_ms.lock().expect("latency lock poisoned");
        let (p50, p95, p99) = percentiles(samples.as_slices().0, samples.as_slices().1);

        MetricsSnapshot {
            modbus_requests_total: self.modbus_total.load(Ordering::Relaxed),
            modbus_requests_success: self.modbus_success.load(Ordering::Relaxed),
            modbus_requests_failed: self.modbus_failed.load(Ordering::Relaxed),
            modbus_latency_p50_ms: p50,
            modbus_latency_p95_ms: p95,
            modbus_latency_p99_ms: p99,
            cache_hits,
            cache_misses,
            cache_sets,
            cache_evictions,
            polling_cycles_completed: self.polling_cycles.load(Ordering::Relaxed),
            polling_targets_success: self.polling_targets_success.load(Ordering::Relaxed),
            polling_targets_failed: self.polling_targets_failed.load(Ordering::Relaxed),
            last_cycle_duration_ms: {
                let value = self.last_cycle_duration_ms.load(Ordering::Relaxed);
                if self.polling_cycles.load(Ordering::Relaxed) == 0 {
                    None
                } else {
                    Some(value)
                }
            },
            last_cycle_at: *self.last_cycle_at.lock().expect("cycle lock poisoned"),
        }
    }

    pub fn reset(&self) {
        self.modbus_total.store(0, Ordering::Relaxed);
        self.modbus_success.store(0, Ordering::Relaxed);
        self.modbus_failed.store(0, Ordering::Relaxed);
        self.latency_samples_ms.lock().expect("latency lock poisoned").clear();
        self.polling_cycles.store(0, Ordering::Relaxed);
        self.polling_targets_success.store(0, Ordering::Relaxed);
        self.polling_targets_failed.store(0, Ordering::Relaxed);
        self.last_cycle_duration_ms.store(0, Ordering::Relaxed);
        *self.last_cycle_at.lock().expect("cycle lock poisoned") = None;
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn percentiles(front: &[u64], back: &[u64]) -> (f64, f64, f64) {
    let mut all: Vec<u64> = Vec::with_capacity(front.len() + back.len());
    all.extend_from_slice(front);
    all.extend_from_slice(back);
    if all.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    all.sort_unstable();
    (
        percentile_at(&all, 0.50),
        percentile_at(&all, 0.95),
        percentile_at(&all, 0.99),
    )
}

fn percentile_at(sorted: &[u64], p: f64) -> f64 {
    let len = sorted.len();
    if len == 1 {
        return sorted[0] as f64;
    }
    let rank = (p * (len - 1) as f64).round() as usize;
    sorted[rank.min(len - 1)] as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modbus_counters_increment() {
        let telemetry = Telemetry::new();
        telemetry.record_modbus_request(true, 10);
        telemetry.record_modbus_request(false, 20);
        let snapshot = telemetry.snapshot(0, 0, 0, 0);
        assert_eq!(snapshot.modbus_requests_total, 2);
        assert_eq!(snapshot.modbus_requests_success, 1);
        assert_eq!(snapshot.modbus_requests_failed, 1);
    }

    #[test]
    fn percentiles_reflect_distribution() {
        let telemetry = Telemetry::new();
        for ms in 1..=100u64 {
            telemetry.record_modbus_request(true, ms);
        }
        let snapshot = telemetry.snapshot(0, 0, 0, 0);
        assert!((snapshot.modbus_latency_p50_ms - 50.0).abs() <= 1.0);
        assert!(snapshot.modbus_latency_p99_ms >= snapshot.modbus_latency_p95_ms);
    }

    #[test]
    fn reset_clears_counters() {
        let telemetry = Telemetry::new();
        telemetry.record_modbus_request(true, 5);
        telemetry.reset();
        let snapshot = telemetry.snapshot(0, 0, 0, 0);
        assert_eq!(snapshot.modbus_requests_total, 0);
        assert_eq!(snapshot.last_cycle_duration_ms, None);
    }

    #[test]
    fn cycle_without_history_reports_no_duration() {
        let telemetry = Telemetry::new();
        let snapshot = telemetry.snapshot(0, 0, 0, 0);
        assert_eq!(snapshot.last_cycle_duration_ms, None);
        assert_eq!(snapshot.last_cycle_at, None);
    }
}
