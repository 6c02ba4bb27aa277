// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resilience primitives for the agent mesh control plane: cancellation
//! tokens, a circuit breaker, and a generic retry loop.

pub mod breaker;
pub mod cancel;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerEvent, BreakerMetrics, BreakerState, CircuitBreaker};
pub use cancel::{CancellationReason, CancellationToken};
pub use retry::{
    compute_delay, retry_async, BackoffPolicy, RetryAttempt, RetryConfig, RetryMetadata,
    RetryOutcome, RetryableError,
};
