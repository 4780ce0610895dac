//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Backoff for `attempt` under a configured retry policy.
pub fn retry_delay(policy: &RetryConfig, attempt: u32) -> Duration {
    calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_with_bounded_jitter() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!((100..110).contains(&b1.as_millis()));

        let b2 = calculate_backoff(2, 100, 2000);
        assert!((200..220).contains(&b2.as_millis()));

        let max = calculate_backoff(10, 100, 1000);
        assert!((1000..1100).contains(&max.as_millis()));
    }

    #[test]
    fn zero_attempt_and_overflow() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);
        assert!(calculate_backoff(80, u64::MAX, 500).as_millis() < 550);
    }

    #[test]
    fn uses_policy() {
        let policy = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 15,
        };
        assert!(retry_delay(&policy, 3).as_millis() >= 15);
    }
}
