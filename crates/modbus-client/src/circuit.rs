use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

/// Per-gateway failure tracker: closed -> open after N consecutive
/// failures, open for T seconds, then one half-open probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

#[derive(Debug)]
struct Inner {
    state: State,
    fail_count: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Closed,
                fail_count: 0,
                opened_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    /// Called before attempting I/O. Returns an error without touching the
    /// network if the breaker is open and recovery hasn't elapsed yet.
    pub async fn check(&self) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::Closed => Ok(()),
            State::HalfOpen => Ok(()),
            State::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= self.recovery_timeout {
                    inner.state = State::HalfOpen;
                    Ok(())
                } else {
                    let remaining = self.recovery_timeout - elapsed;
                    Err(GatewayError::CircuitOpen {
                        retry_after_seconds: remaining.as_secs().max(1),
                    })
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = State::Closed;
        inner.fail_count = 0;
        inner.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.fail_count = self.failure_threshold;
            }
            State::Closed | State::Open => {
                inner.fail_count += 1;
                if inner.fail_count >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }

    pub async fn is_open(&self) -> bool {
        matches!(self.inner.lock().await.state, State::Open)
    }

    /// Remaining seconds until the breaker allows a half-open probe, or
    /// `None` if it isn't open.
    pub async fn retry_after_seconds(&self) -> Option<u64> {
        let inner = self.inner.lock().await;
        if inner.state != State::Open {
            return None;
        }
        let opened_at = inner.opened_at?;
        let elapsed = opened_at.elapsed();
        Some(self.recovery_timeout.saturating_sub(elapsed).as_secs().max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        for _ in 0..2 {
            breaker.record_failure().await;
            assert!(breaker.check().await.is_ok());
        }
        breaker.record_failure().await;
        assert!(breaker.check().await.is_err());
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure().await;
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(breaker.check().await.is_ok());
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure().await;
        assert!(breaker.check().await.is_err());
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(breaker.check().await.is_ok());
        breaker.record_failure().await;
        assert!(breaker.check().await.is_err());
    }
}
