//! Three-state circuit breaker protecting calls to external, potentially
//! failing services (LLM providers, AI-driven fetchers, ...).
//!
//! Mirrors the classic closed → open → half-open state machine: a run of
//! consecutive failures opens the circuit, a recovery timeout allows a
//! handful of half-open probe calls through, and those probes either close
//! the circuit again or send it back to open.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

#[derive(Debug, Error)]
#[error("circuit breaker '{0}' is open")]
pub struct CircuitOpenError(pub String);

/// Error returned by [`CircuitBreaker::call`]/[`CircuitBreaker::call_async`]:
/// either the circuit rejected the call, or the wrapped call itself failed.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),
    #[error(transparent)]
    Inner(E),
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_calls: u32,
    opened_at: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout: Duration,
        half_open_max_calls: u32,
    ) -> Self {
        CircuitBreaker {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            half_open_max_calls,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                half_open_calls: 0,
                opened_at: None,
                total_calls: 0,
                total_failures: 0,
                total_rejections: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether a call should be allowed through, transitioning
    /// open → half-open if the recovery timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.total_calls += 1;
        self.check_state_transition(&mut inner);

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                inner.total_rejections += 1;
                false
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    inner.total_rejections += 1;
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.success_count += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                if inner.success_count >= self.half_open_max_calls {
                    self.close_circuit(&mut inner);
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count += 1;
        inner.total_failures += 1;

        match inner.state {
            CircuitState::HalfOpen => self.open_circuit(&mut inner),
            CircuitState::Closed => {
                if inner.failure_count >= self.failure_threshold {
                    self.open_circuit(&mut inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.close_circuit(&mut inner);
        inner.total_calls = 0;
        inner.total_failures = 0;
        inner.total_rejections = 0;
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().unwrap();
        self.check_state_transition(&mut inner);
        inner.state
    }

    pub fn stats(&self) -> CircuitStats {
        let mut inner = self.inner.lock().unwrap();
        self.check_state_transition(&mut inner);
        CircuitStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
        }
    }

    /// Execute a synchronous callable, recording success/failure, and
    /// rejecting immediately (or returning `fallback`) when the circuit is
    /// open.
    pub fn call<F, T, E>(&self, fallback: Option<T>, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.can_execute() {
            if let Some(value) = fallback {
                return Ok(value);
            }
            return Err(CircuitOpenError(self.name.clone()).into());
        }

        match f() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitError::Inner(err))
            }
        }
    }

    /// Async counterpart of [`CircuitBreaker::call`], for guarding fetcher
    /// and LLM-provider calls that are themselves `async`.
    pub async fn call_async<Fut, T, E>(
        &self,
        fallback: Option<T>,
        fut: Fut,
    ) -> Result<T, CircuitError<E>>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.can_execute() {
            if let Some(value) = fallback {
                return Ok(value);
            }
            return Err(CircuitOpenError(self.name.clone()).into());
        }

        match fut.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitError::Inner(err))
            }
        }
    }

    fn check_state_transition(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.recovery_timeout {
                    self.half_open_circuit(inner);
                }
            }
        }
    }

    fn open_circuit(&self, inner: &mut Inner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        tracing::warn!(breaker = %self.name, "circuit breaker opened");
    }

    fn half_open_circuit(&self, inner: &mut Inner) {
        inner.state = CircuitState::HalfOpen;
        inner.half_open_calls = 0;
        inner.success_count = 0;
        inner.failure_count = 0;
        tracing::info!(breaker = %self.name, "circuit breaker half-open");
    }

    fn close_circuit(&self, inner: &mut Inner) {
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_calls = 0;
        inner.opened_at = None;
    }
}

static REGISTRY: Lazy<Mutex<HashMap<String, std::sync::Arc<CircuitBreaker>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Get or create a named circuit breaker. Breakers are cached by name: a
/// later call with different parameters does not override the one already
/// registered.
pub fn get_circuit_breaker(
    name: &str,
    failure_threshold: u32,
    recovery_timeout: Duration,
) -> std::sync::Arc<CircuitBreaker> {
    let mut registry = REGISTRY.lock().unwrap();
    registry
        .entry(name.to_string())
        .or_insert_with(|| {
            std::sync::Arc::new(CircuitBreaker::new(
                name,
                failure_threshold,
                recovery_timeout,
                3,
            ))
        })
        .clone()
}

/// Reset the process-wide registry. Intended for test teardown (spec §6:
/// "all three have deterministic init and support teardown for testing").
pub fn reset_registry() {
    REGISTRY.lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("svc", 3, Duration::from_millis(100), 2);

        for _ in 0..3 {
            assert!(breaker.can_execute());
            breaker.record_failure();
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn success_resets_consecutive_failures_while_closed() {
        let breaker = CircuitBreaker::new("svc", 3, Duration::from_millis(100), 2);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_then_closes_on_successes() {
        let breaker = CircuitBreaker::new("svc", 2, Duration::from_millis(20), 2);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(breaker.can_execute());
        breaker.record_success();
        assert!(breaker.can_execute());
        breaker.record_success();

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_millis(10), 2);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(breaker.can_execute());
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn registry_returns_same_instance_by_name() {
        reset_registry();
        let a = get_circuit_breaker("llm", 5, Duration::from_secs(30));
        let b = get_circuit_breaker("llm", 99, Duration::from_secs(1));

        assert_eq!(a.failure_threshold, b.failure_threshold);
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn call_wrapper_records_outcome_and_honors_fallback() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_secs(60), 1);

        let err: Result<(), CircuitError<&str>> = breaker.call(None, || Err("boom"));
        assert!(matches!(err, Err(CircuitError::Inner("boom"))));
        assert_eq!(breaker.state(), CircuitState::Open);

        let fell_back = breaker.call(Some(42), || -> Result<i32, &str> { Ok(0) });
        assert!(matches!(fell_back, Ok(42)));
    }
}
