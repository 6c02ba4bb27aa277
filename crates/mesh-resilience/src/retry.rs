// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generic retry loop with pluggable backoff policies.

use crate::cancel::CancellationToken;
use mesh_error::{ErrorCode, MeshError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Backoff policy selecting how the delay between attempts grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// `base * multiplier^attempt`, capped at `max_delay`.
    Exponential {
        /// Growth multiplier applied per attempt.
        multiplier: f64,
    },
    /// `base * (attempt + 1)`, capped at `max_delay`.
    Linear,
    /// Always `base`, regardless of attempt number.
    Fixed,
    /// Always zero delay.
    Immediate,
}

/// Configuration for a retry loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial attempt. `0`
    /// means only the initial attempt is made.
    pub max_retries: u32,
    /// Base delay used by the backoff policy.
    pub base_delay: Duration,
    /// Upper bound applied to any computed delay.
    pub max_delay: Duration,
    /// Wall-clock budget spanning every attempt and every backoff sleep.
    pub overall_timeout: Duration,
    /// Jitter factor in `[0.0, 1.0]`; the nominal delay is perturbed by up
    /// to `± delay * jitter_factor`, uniformly distributed.
    pub jitter_factor: f64,
    /// Which backoff shape to apply.
    pub policy: BackoffPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            overall_timeout: Duration::from_secs(60),
            jitter_factor: 0.2,
            policy: BackoffPolicy::Exponential { multiplier: 2.0 },
        }
    }
}

/// Record of a single failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// Zero-indexed attempt number.
    pub attempt: u32,
    /// Error message captured from this attempt.
    pub error: String,
    /// Backoff delay applied before the next attempt.
    pub delay: Duration,
}

/// Metadata captured across all attempts of a retry loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryMetadata {
    /// Total number of attempts made, including the successful one (if any).
    pub total_attempts: u32,
    /// Records of each failed attempt, in order.
    pub failed_attempts: Vec<RetryAttempt>,
    /// Wall-clock time spanning all attempts and backoff sleeps.
    pub total_duration: Duration,
}

/// Result of a retry-wrapped operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The value produced by the eventually-successful attempt.
    pub value: T,
    /// Metadata describing the attempts leading up to success.
    pub metadata: RetryMetadata,
}

/// Trait implemented by error types that know whether they warrant a retry.
///
/// [`MeshError`] already implements this via [`MeshError::is_retryable`],
/// so most callers never need a custom impl.
pub trait RetryableError: std::fmt::Display {
    /// Whether this error should trigger another attempt.
    fn is_retryable(&self) -> bool;

    /// Convert into the unified error type. The default wraps the error's
    /// `Display` text under [`ErrorCode::Internal`]; types that already
    /// carry a [`MeshError`] (or can cheaply produce one) should override
    /// this to hand it back unchanged instead of losing its code/category.
    fn into_mesh_error(self) -> MeshError
    where
        Self: Sized,
    {
        MeshError::new(ErrorCode::Internal, self.to_string())
    }
}

impl RetryableError for MeshError {
    fn is_retryable(&self) -> bool {
        MeshError::is_retryable(self)
    }

    fn into_mesh_error(self) -> MeshError {
        self
    }
}

/// Compute the nominal (pre-jitter) delay for a zero-indexed attempt.
fn nominal_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let ms = match &config.policy {
        BackoffPolicy::Exponential { multiplier } => {
            let factor = multiplier.max(1.0).powi(attempt as i32);
            ((base_ms as f64) * factor) as u64
        }
        BackoffPolicy::Linear => base_ms.saturating_mul(u64::from(attempt) + 1),
        BackoffPolicy::Fixed => base_ms,
        BackoffPolicy::Immediate => 0,
    };
    Duration::from_millis(ms.min(config.max_delay.as_millis() as u64))
}

/// Compute the backoff delay for a zero-indexed attempt, including jitter.
///
/// Jitter is a uniform `± delay * jitter_factor` perturbation seeded from
/// the system clock, so repeated calls for the same attempt do not collide
/// in lockstep across concurrent callers.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let nominal = nominal_delay(config, attempt);
    let jitter_factor = config.jitter_factor.clamp(0.0, 1.0);
    if jitter_factor <= 0.0 || nominal.is_zero() {
        return nominal;
    }

    let nominal_ms = nominal.as_millis() as i64;
    let spread = (nominal_ms as f64 * jitter_factor) as i64;
    if spread <= 0 {
        return nominal;
    }

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as i64;
    let pseudo = nanos.wrapping_mul(i64::from(attempt) + 1);
    let offset = (pseudo % (2 * spread + 1)) - spread;

    let jittered_ms = (nominal_ms + offset).max(0) as u64;
    Duration::from_millis(jittered_ms.min(config.max_delay.as_millis() as u64))
}

/// Run `op` up to `max_retries + 1` times, backing off between failures
/// according to `config.policy`, until it succeeds, a non-retryable error
/// is returned, the retry budget is exhausted, the overall timeout elapses,
/// or `cancel` is triggered.
pub async fn retry_async<T, E, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<RetryOutcome<T>, MeshError>
where
    E: RetryableError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let max_attempts = config.max_retries + 1;
    let mut failed_attempts = Vec::new();

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(MeshError::new(ErrorCode::Cancelled, "retry loop cancelled")
                .with_context("attempt", attempt));
        }

        if start.elapsed() >= config.overall_timeout {
            warn!(target: "mesh.retry", attempt, "overall retry timeout exceeded");
            return Err(
                MeshError::new(ErrorCode::Timeout, "retry overall timeout exceeded")
                    .with_context("attempt", attempt),
            );
        }

        debug!(target: "mesh.retry", attempt, max_attempts, "attempting operation");

        match op().await {
            Ok(value) => {
                let total_duration = start.elapsed();
                debug!(
                    target: "mesh.retry",
                    attempt,
                    total_duration_ms = total_duration.as_millis() as u64,
                    "operation succeeded"
                );
                return Ok(RetryOutcome {
                    value,
                    metadata: RetryMetadata {
                        total_attempts: attempt + 1,
                        failed_attempts,
                        total_duration,
                    },
                });
            }
            Err(err) => {
                let is_last = attempt + 1 >= max_attempts;

                if !err.is_retryable() {
                    debug!(target: "mesh.retry", error = %err, "non-retryable error, giving up");
                    return Err(err.into_mesh_error());
                }

                if is_last {
                    warn!(target: "mesh.retry", error = %err, attempt, "retry attempts exhausted");
                    let last = err.into_mesh_error();
                    return Err(MeshError::new(
                        ErrorCode::RetryExhausted,
                        format!("retry attempts exhausted after {} attempts: {}", attempt + 1, last.message),
                    )
                    .with_context("total_attempts", attempt + 1)
                    .with_context("last_error_code", last.code));
                }

                let delay = compute_delay(config, attempt);
                warn!(
                    target: "mesh.retry",
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retryable error, backing off"
                );
                failed_attempts.push(RetryAttempt {
                    attempt,
                    error: err.to_string(),
                    delay,
                });

                let remaining = config.overall_timeout.saturating_sub(start.elapsed());
                if delay > remaining {
                    return Err(MeshError::new(
                        ErrorCode::Timeout,
                        "retry overall timeout would be exceeded by next backoff",
                    ));
                }

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(MeshError::new(ErrorCode::Cancelled, "retry loop cancelled during backoff"));
                    }
                }
            }
        }
    }

    Err(MeshError::new(ErrorCode::RetryExhausted, "retry loop exited without a result"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Boom(bool);

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl RetryableError for Boom {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            overall_timeout: Duration::from_secs(5),
            jitter_factor: 0.0,
            policy: BackoffPolicy::Fixed,
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let cancel = CancellationToken::new();
        let outcome = retry_async(&fast_config(3), &cancel, || async { Ok::<_, Boom>(42) })
            .await
            .unwrap();
        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.metadata.total_attempts, 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let calls_clone = calls.clone();
        let outcome = retry_async(&fast_config(5), &cancel, move || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Boom(true))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(outcome.metadata.total_attempts, 3);
        assert_eq!(outcome.metadata.failed_attempts.len(), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let calls_clone = calls.clone();
        let result = retry_async(&fast_config(5), &cancel, move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Boom(false))
            }
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retry_budget() {
        let cancel = CancellationToken::new();
        let result = retry_async(&fast_config(2), &cancel, || async { Err::<(), _>(Boom(true)) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancellation_short_circuits_loop() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = retry_async(&fast_config(5), &cancel, || async { Err::<(), _>(Boom(true)) })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn exponential_delay_grows_and_caps() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            overall_timeout: Duration::from_secs(60),
            jitter_factor: 0.0,
            policy: BackoffPolicy::Exponential { multiplier: 2.0 },
        };
        assert_eq!(nominal_delay(&config, 0), Duration::from_millis(100));
        assert_eq!(nominal_delay(&config, 1), Duration::from_millis(200));
        assert_eq!(nominal_delay(&config, 2), Duration::from_millis(400));
        assert_eq!(nominal_delay(&config, 10), Duration::from_secs(1));
    }

    #[test]
    fn linear_delay_scales_with_attempt() {
        let config = RetryConfig {
            policy: BackoffPolicy::Linear,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(10),
            ..fast_config(3)
        };
        assert_eq!(nominal_delay(&config, 0), Duration::from_millis(50));
        assert_eq!(nominal_delay(&config, 3), Duration::from_millis(200));
    }

    #[test]
    fn immediate_policy_is_always_zero() {
        let config = RetryConfig { policy: BackoffPolicy::Immediate, ..fast_config(3) };
        assert_eq!(nominal_delay(&config, 0), Duration::ZERO);
        assert_eq!(nominal_delay(&config, 9), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = RetryConfig {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(1000),
            jitter_factor: 0.5,
            policy: BackoffPolicy::Fixed,
            ..fast_config(3)
        };
        for attempt in 0..20 {
            let delay = compute_delay(&config, attempt).as_millis() as i64;
            assert!((500..=1000).contains(&delay), "delay {delay} out of bounds");
        }
    }
}
