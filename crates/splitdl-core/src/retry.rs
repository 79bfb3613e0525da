//! Retry and backoff policy for connection slots.
//!
//! Transient failures put a slot back to sleep for an exponentially growing
//! delay; once the retry budget is spent the slot gives up (other slots go on).

use std::time::Duration;

use crate::error::ErrorClass;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with caps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed per slot after the first attempt; 0 = unlimited.
    pub max_retries: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after the `failures`-th failure (1-based) of a slot.
    pub fn decide(&self, failures: u32, class: ErrorClass) -> RetryDecision {
        match class {
            ErrorClass::Transient | ErrorClass::Integrity => {}
            ErrorClass::SlotFatal | ErrorClass::EngineFatal | ErrorClass::Invariant => {
                return RetryDecision::NoRetry
            }
        }
        if self.max_retries != 0 && failures > self.max_retries {
            return RetryDecision::NoRetry;
        }
        // base * 2^(failures-1), capped.
        let exp = 1u32 << failures.saturating_sub(1).min(8);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_retry_for_fatal_classes() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorClass::SlotFatal), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorClass::EngineFatal), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorClass::Invariant), RetryDecision::NoRetry);
    }

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let p = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let delay = |n| match p.decide(n, ErrorClass::Transient) {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        };
        assert_eq!(delay(1), Duration::from_secs(1));
        assert_eq!(delay(2), Duration::from_secs(2));
        assert_eq!(delay(3), Duration::from_secs(4));
        assert_eq!(delay(50), p.max_delay);
    }

    #[test]
    fn respects_retry_budget() {
        let p = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        assert!(matches!(p.decide(1, ErrorClass::Transient), RetryDecision::RetryAfter(_)));
        assert!(matches!(p.decide(2, ErrorClass::Integrity), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(3, ErrorClass::Transient), RetryDecision::NoRetry);
    }

    #[test]
    fn zero_means_unlimited() {
        let p = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        assert!(matches!(
            p.decide(10_000, ErrorClass::Transient),
            RetryDecision::RetryAfter(_)
        ));
    }
}
