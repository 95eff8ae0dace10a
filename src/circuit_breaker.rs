//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for face-swap job
//! submission. It stops sending paid jobs to the provider while it keeps
//! failing, and lets a single trial through once the reset timeout passes.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for remote provider operations
///
/// # State Machine
///
/// - **Closed**: Normal operation, requests pass through
/// - **Open**: Failure threshold exceeded, requests fail fast
/// - **Half-Open**: Reset timeout elapsed, the next request is a trial
///
/// # Configuration
///
/// Uses `RecoveryConfig` for:
/// - `circuit_breaker_threshold`: Failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before attempting reset (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use faceswap_bot::config::RecoveryConfig;
    /// use faceswap_bot::circuit_breaker::CircuitBreaker;
    ///
    /// let circuit_breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!circuit_breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check if circuit breaker is open (blocking requests)
    ///
    /// Returns `true` when failure count >= threshold and the reset time
    /// hasn't elapsed. Once it has, the breaker half-opens: the counter is
    /// kept at the threshold minus one so a single further failure reopens it.
    pub fn is_open(&self) -> bool {
        let mut state = self.lock();

        if state.failure_count < self.config.circuit_breaker_threshold {
            return false;
        }
        match state.last_failure_time {
            Some(last_time)
                if last_time.elapsed() < Duration::from_secs(self.config.circuit_breaker_reset_secs) =>
            {
                true
            }
            _ => {
                info!("Circuit breaker half-open, allowing a trial request");
                state.failure_count = self.config.circuit_breaker_threshold.saturating_sub(1);
                false
            }
        }
    }

    /// Record a failure to increment the failure counter
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
        if state.failure_count == self.config.circuit_breaker_threshold {
            warn!(
                failures = state.failure_count,
                "Circuit breaker opened for face-swap provider"
            );
        }
    }

    /// Record a success to reset the failure counter
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.failure_count = 0;
        state.last_failure_time = None;
    }
}
