// SPDX-License-Identifier: MIT OR Apache-2.0
//! Circuit breaker: fail-fast wrapper around any operation with a
//! Closed/Open/HalfOpen state machine.

use mesh_error::{ErrorCode, MeshError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;

const HISTORY_CAP: usize = 100;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Executes every call; tracks consecutive failures.
    Closed,
    /// Fails fast without invoking the wrapped call.
    Open,
    /// Probationary state after the cooldown elapses.
    HalfOpen,
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures in `Closed` before tripping to `Open`.
    pub failure_threshold: u32,
    /// Consecutive successes in `HalfOpen` before closing.
    pub success_threshold: u32,
    /// How long the breaker stays `Open` before allowing a probe call.
    pub cooldown: Duration,
    /// Bounded diagnostic history length.
    pub history_cap: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(30),
            history_cap: HISTORY_CAP,
        }
    }
}

/// A single recorded event for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BreakerEvent {
    /// A call succeeded.
    Success,
    /// A call failed.
    Failure,
    /// The breaker transitioned between states.
    StateChanged {
        /// Prior state.
        from: BreakerState,
        /// New state.
        to: BreakerState,
    },
}

/// Point-in-time metrics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Current state.
    pub state: BreakerState,
    /// Total calls observed.
    pub total: u64,
    /// Calls that succeeded.
    pub successful: u64,
    /// Calls that failed.
    pub failed: u64,
    /// Failed calls whose error category was `Timeout`.
    pub timeouts: u64,
    /// Calls rejected while `Open`.
    pub short_circuited: u64,
    /// Number of `Closed -> Open` transitions.
    pub opens: u64,
    /// Number of `HalfOpen -> Closed` transitions.
    pub closes: u64,
    /// `failed / total`, or `0.0` when no calls have been observed.
    pub failure_rate: f64,
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    next_attempt: Option<Instant>,
    history: VecDeque<BreakerEvent>,
    total: u64,
    successful: u64,
    failed: u64,
    timeouts: u64,
    short_circuited: u64,
    opens: u64,
    closes: u64,
}

/// Fail-fast wrapper around any fallible async operation.
///
/// State transitions happen under a single mutex, so an `execute` call
/// either observes the pre-transition state and proceeds, or observes the
/// post-transition state and fails fast — never a mix of the two.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    /// Create a breaker with the given configuration, starting `Closed`.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                next_attempt: None,
                history: VecDeque::with_capacity(config.history_cap),
                total: 0,
                successful: 0,
                failed: 0,
                timeouts: 0,
                short_circuited: 0,
                opens: 0,
                closes: 0,
            })),
            config,
        }
    }

    /// Current state.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Snapshot current metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        BreakerMetrics {
            state: inner.state,
            total: inner.total,
            successful: inner.successful,
            failed: inner.failed,
            timeouts: inner.timeouts,
            short_circuited: inner.short_circuited,
            opens: inner.opens,
            closes: inner.closes,
            failure_rate: inner.failed as f64 / inner.total.max(1) as f64,
        }
    }

    /// Execute `f`, observing and updating breaker state atomically around
    /// the call.
    ///
    /// Returns [`ErrorCode::CircuitBreakerOpen`] without invoking `f` when
    /// the breaker is `Open` and the cooldown has not yet elapsed.
    pub async fn execute<T, F, Fut>(&self, f: F) -> Result<T, MeshError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MeshError>>,
    {
        if let Some(next_attempt) = self.try_enter()? {
            return Err(MeshError::new(
                ErrorCode::CircuitBreakerOpen,
                "circuit breaker is open",
            )
            .with_context("next_attempt_unix_ms", next_attempt)
            .retryable(false));
        }

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                // Auth errors are a client-side credential issue and do not
                // count toward trip purposes.
                let category = err.category();
                if category != mesh_error::ErrorCategory::Auth {
                    self.on_failure(category == mesh_error::ErrorCategory::Timeout);
                }
                Err(err)
            }
        }
    }

    /// Returns `Some(next_attempt_unix_ms)` if the call should be rejected
    /// without running, or `None` if it may proceed (after performing any
    /// `Open -> HalfOpen` transition this call triggers).
    fn try_enter(&self) -> Result<Option<u64>, MeshError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.total += 1;

        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(None),
            BreakerState::Open => {
                let now = Instant::now();
                let next_attempt = inner.next_attempt.unwrap_or(now);
                if now < next_attempt {
                    inner.short_circuited += 1;
                    let ms = next_attempt.saturating_duration_since(now).as_millis() as u64;
                    return Ok(Some(ms));
                }
                self.transition(&mut inner, BreakerState::HalfOpen);
                inner.failure_count = 0;
                inner.success_count = 0;
                Ok(None)
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.successful += 1;
        inner.history_push(BreakerEvent::Success, self.config.history_cap);

        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, BreakerState::Closed);
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.closes += 1;
                }
            }
            BreakerState::Open => unreachable!("execute never runs f while Open"),
        }
    }

    fn on_failure(&self, was_timeout: bool) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failed += 1;
        if was_timeout {
            inner.timeouts += 1;
        }
        inner.history_push(BreakerEvent::Failure, self.config.history_cap);

        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.trip(&mut inner);
                }
            }
            BreakerState::HalfOpen => {
                self.trip(&mut inner);
            }
            BreakerState::Open => unreachable!("execute never runs f while Open"),
        }
    }

    fn trip(&self, inner: &mut Inner) {
        self.transition(inner, BreakerState::Open);
        inner.next_attempt = Some(Instant::now() + self.config.cooldown);
        inner.opens += 1;
        inner.failure_count = 0;
        inner.success_count = 0;
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.history_push(BreakerEvent::StateChanged { from, to }, self.config.history_cap);
        info!(target: "mesh.breaker", ?from, ?to, "circuit breaker state change");
    }
}

impl Inner {
    fn history_push(&mut self, event: BreakerEvent, cap: usize) {
        if self.history.len() >= cap {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, success_threshold: u32, cooldown_ms: u64) -> BreakerConfig {
        BreakerConfig {
            failure_threshold,
            success_threshold,
            cooldown: Duration::from_millis(cooldown_ms),
            history_cap: HISTORY_CAP,
        }
    }

    async fn fail() -> Result<(), MeshError> {
        Err(MeshError::new(ErrorCode::NetworkFault, "boom"))
    }

    async fn ok() -> Result<(), MeshError> {
        Ok(())
    }

    #[tokio::test]
    async fn trips_after_failure_threshold() {
        let breaker = CircuitBreaker::new(config(3, 1, 10_000));
        for _ in 0..3 {
            let _ = breaker.execute(|| fail()).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn rejects_without_invoking_when_open() {
        let breaker = CircuitBreaker::new(config(1, 1, 10_000));
        let _ = breaker.execute(|| fail()).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = breaker
            .execute(move || {
                calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                ok()
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn half_opens_after_cooldown_and_closes_on_success() {
        let breaker = CircuitBreaker::new(config(1, 1, 20));
        let _ = breaker.execute(|| fail()).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = breaker.execute(|| ok()).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config(1, 2, 20));
        let _ = breaker.execute(|| fail()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let _ = breaker.execute(|| fail()).await;
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn success_in_closed_resets_failure_count() {
        let breaker = CircuitBreaker::new(config(3, 1, 10_000));
        let _ = breaker.execute(|| fail()).await;
        let _ = breaker.execute(|| ok()).await;
        let _ = breaker.execute(|| fail()).await;
        let _ = breaker.execute(|| fail()).await;
        // Only 2 consecutive failures since the reset; threshold is 3.
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn auth_errors_do_not_count_toward_trip() {
        let breaker = CircuitBreaker::new(config(2, 1, 10_000));
        for _ in 0..5 {
            let _ = breaker
                .execute(|| async { Err(MeshError::new(ErrorCode::AuthRejected, "nope")) })
                .await;
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn metrics_track_totals() {
        let breaker = CircuitBreaker::new(config(10, 1, 10_000));
        let _ = breaker.execute(|| ok()).await;
        let _ = breaker.execute(|| fail()).await;
        let metrics = breaker.metrics();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.successful, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.failure_rate, 0.5);
    }

    #[tokio::test]
    async fn metrics_count_timeout_failures_separately() {
        let breaker = CircuitBreaker::new(config(10, 1, 10_000));
        let _ = breaker
            .execute(|| async { Err(MeshError::new(ErrorCode::Timeout, "timed out")) })
            .await;
        let _ = breaker.execute(|| fail()).await;
        let metrics = breaker.metrics();
        assert_eq!(metrics.failed, 2);
        assert_eq!(metrics.timeouts, 1);
    }
}
