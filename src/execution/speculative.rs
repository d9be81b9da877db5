//! Speculative execution policy (spec.md §4.D "Speculative execution").
//!
//! Grounded on the teacher's `networking::loadbalancer::retry` backoff-delay
//! shape, reused here as a fixed-delay trigger for a secondary attempt
//! racing the first against the next host in the plan.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait SpeculativeExecutionPolicy: Send + Sync {
    /// Delay before launching the next speculative attempt, or `None` if no
    /// further attempts should be launched (spec.md "at most N-1 additional
    /// attempts, space `delay` apart").
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Launches up to `max_attempts` total attempts, each `delay` apart.
pub struct ConstantDelaySpeculativeExecutionPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl SpeculativeExecutionPolicy for ConstantDelaySpeculativeExecutionPolicy {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }
}

/// Disables speculative execution entirely.
#[derive(Default)]
pub struct NoSpeculativeExecutionPolicy;

impl SpeculativeExecutionPolicy for NoSpeculativeExecutionPolicy {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_delay_stops_at_max_attempts() {
        let policy = ConstantDelaySpeculativeExecutionPolicy { delay: Duration::from_millis(100), max_attempts: 3 };
        assert_eq!(policy.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), None);
    }

    #[test]
    fn disabled_policy_never_speculates() {
        let policy = NoSpeculativeExecutionPolicy;
        assert_eq!(policy.next_delay(0), None);
    }
}
