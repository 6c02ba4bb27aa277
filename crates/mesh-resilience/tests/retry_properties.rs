// SPDX-License-Identifier: MIT OR Apache-2.0
use mesh_resilience::{compute_delay, BackoffPolicy, RetryConfig};
use proptest::prelude::*;
use std::time::Duration;

fn exponential_config(base_ms: u64, max_ms: u64) -> RetryConfig {
    RetryConfig {
        max_retries: 10,
        base_delay: Duration::from_millis(base_ms),
        max_delay: Duration::from_millis(max_ms),
        overall_timeout: Duration::from_secs(60),
        jitter_factor: 0.0,
        policy: BackoffPolicy::Exponential { multiplier: 2.0 },
    }
}

proptest! {
    #[test]
    fn exponential_delay_never_exceeds_cap(base_ms in 1u64..500, max_ms in 500u64..5000, attempt in 0u32..20) {
        let config = exponential_config(base_ms, max_ms);
        let delay = compute_delay(&config, attempt);
        prop_assert!(delay.as_millis() as u64 <= max_ms);
    }

    #[test]
    fn exponential_delay_is_monotonic_until_capped(base_ms in 1u64..200, max_ms in 1000u64..10_000) {
        let config = exponential_config(base_ms, max_ms);
        let mut prev = compute_delay(&config, 0).as_millis();
        for attempt in 1..12u32 {
            let next = compute_delay(&config, attempt).as_millis();
            prop_assert!(next >= prev);
            prev = next;
        }
    }
}
