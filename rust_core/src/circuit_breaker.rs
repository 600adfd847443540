//! Health gate for the metered headless-browser fallback.
//!
//! The fallback is slow and billed per call, so a run only reaches for it
//! while the backend looks healthy. Consecutive render failures open the
//! gate; a quota or credential rejection opens it at once. After the
//! recovery timeout one trial call is let through, and enough successes
//! close the gate again.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Externally visible gate state, reported with every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the gate
    pub failure_threshold: u32,
    /// Time the gate stays open before a trial call
    pub recovery_timeout: Duration,
    /// Successful trial calls needed to close the gate
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(300),
            success_threshold: 1,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    trips: u32,
    last_trip_reason: Option<String>,
}

/// Point-in-time view of a breaker, serialized into the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub backend: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Times the gate opened since the process started
    pub trips: u32,
    pub last_trip_reason: Option<String>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    backend: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(backend: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            backend: backend.to_string(),
            config,
            inner: Mutex::new(Inner {
                phase: Phase::Closed { failures: 0 },
                trips: 0,
                last_trip_reason: None,
            }),
        }
    }

    /// Whether a call may go through now. An open gate whose recovery
    /// timeout elapsed moves to half-open and admits the call.
    pub fn is_available(&self) -> bool {
        let inner = &mut *self.inner.lock();
        match inner.phase {
            Phase::Closed { .. } | Phase::HalfOpen { .. } => true,
            Phase::Open { since } if since.elapsed() >= self.config.recovery_timeout => {
                info!(backend = %self.backend, "Recovery timeout elapsed, allowing a trial call");
                inner.phase = Phase::HalfOpen { successes: 0 };
                true
            }
            Phase::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        let inner = &mut *self.inner.lock();
        inner.phase = match inner.phase {
            Phase::HalfOpen { successes } if successes + 1 < self.config.success_threshold => Phase::HalfOpen {
                successes: successes + 1,
            },
            Phase::HalfOpen { .. } => {
                info!(backend = %self.backend, "Backend recovered, closing gate");
                Phase::Closed { failures: 0 }
            }
            _ => Phase::Closed { failures: 0 },
        };
    }

    pub fn record_failure(&self, reason: &str) {
        let inner = &mut *self.inner.lock();
        match inner.phase {
            Phase::Closed { failures } if failures + 1 < self.config.failure_threshold => {
                inner.phase = Phase::Closed { failures: failures + 1 };
            }
            Phase::Closed { .. } | Phase::HalfOpen { .. } => self.open(inner, reason),
            Phase::Open { .. } => {}
        }
    }

    /// Open immediately, whatever the failure count. Used when the backend
    /// rejects the account (quota exhausted, bad token) since retrying
    /// cannot succeed before the recovery timeout.
    pub fn trip(&self, reason: &str) {
        let inner = &mut *self.inner.lock();
        if !matches!(inner.phase, Phase::Open { .. }) {
            self.open(inner, reason);
        }
    }

    fn open(&self, inner: &mut Inner, reason: &str) {
        warn!(
            backend = %self.backend,
            recovery_secs = self.config.recovery_timeout.as_secs(),
            "Opening gate: {}",
            reason
        );
        inner.phase = Phase::Open { since: Instant::now() };
        inner.trips += 1;
        inner.last_trip_reason = Some(reason.to_string());
    }

    pub fn state(&self) -> CircuitState {
        match self.inner.lock().phase {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        let (state, consecutive_failures) = match inner.phase {
            Phase::Closed { failures } => (CircuitState::Closed, failures),
            Phase::Open { .. } => (CircuitState::Open, 0),
            Phase::HalfOpen { .. } => (CircuitState::HalfOpen, 0),
        };
        CircuitSnapshot {
            backend: self.backend.clone(),
            state,
            consecutive_failures,
            trips: inner.trips,
            last_trip_reason: inner.last_trip_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "browserless",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: recovery,
                success_threshold: 2,
            },
        )
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = breaker(3, Duration::from_secs(60));
        cb.record_failure("timeout");
        cb.record_failure("timeout");
        assert!(cb.is_available());
        assert_eq!(cb.snapshot().consecutive_failures, 2);

        cb.record_failure("timeout");
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.is_available());
        assert_eq!(cb.snapshot().trips, 1);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(2, Duration::from_secs(60));
        cb.record_failure("timeout");
        cb.record_success();
        cb.record_failure("timeout");
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_trip_opens_immediately() {
        let cb = breaker(5, Duration::from_secs(60));
        cb.trip("quota exhausted (429)");
        cb.trip("quota exhausted (429)");

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.trips, 1);
        assert_eq!(snapshot.last_trip_reason.as_deref(), Some("quota exhausted (429)"));
        assert!(!cb.is_available());
    }

    #[test]
    fn test_half_open_then_closed() {
        let cb = breaker(1, Duration::from_millis(10));
        cb.record_failure("timeout");
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.is_available());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failure_in_half_open_reopens() {
        let cb = breaker(3, Duration::from_millis(10));
        cb.trip("bad token");
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.is_available());

        cb.record_failure("timeout");
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().trips, 2);
    }

    #[test]
    fn test_snapshot_serializes_state() {
        let cb = breaker(1, Duration::from_secs(60));
        cb.record_failure("timeout");
        let json = serde_json::to_value(cb.snapshot()).unwrap();
        assert_eq!(json["backend"], "browserless");
        assert_eq!(json["state"], "open");
    }
}
