//! Reconnection backoff strategy interface (spec.md §1 "abstract strategy
//! interfaces", §4.B "Reconnection semantics").
//!
//! Grounded on the teacher's `networking::loadbalancer::retry::RetryStrategy`
//! exponential-with-jitter schedule, narrowed to the single responsibility
//! of generating a reconnection delay sequence per host.

use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Generates successive reconnection delays for a single down host. A new
/// schedule instance is created each time a host goes DOWN.
#[async_trait]
pub trait ReconnectionPolicy: Send + Sync + fmt::Debug {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule>;
}

pub trait ReconnectionSchedule: Send + Sync {
    /// The delay before the next reconnection attempt. Schedules never end
    /// — the caller stops polling when the host comes back `UP` or the
    /// reconnection future is cancelled (spec.md §4.B).
    fn next_delay(&mut self) -> Duration;
}

#[derive(Debug, Clone)]
pub struct ExponentialReconnectionPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ExponentialReconnectionPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectionPolicy for ExponentialReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ExponentialSchedule {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            attempt: 0,
        })
    }
}

struct ExponentialSchedule {
    base_delay: Duration,
    max_delay: Duration,
    attempt: u32,
}

impl ReconnectionSchedule for ExponentialSchedule {
    fn next_delay(&mut self) -> Duration {
        let exp = 2u64.saturating_pow(self.attempt.min(32));
        let base_ms = self.base_delay.as_millis() as u64;
        let raw_ms = base_ms.saturating_mul(exp).min(self.max_delay.as_millis() as u64);
        let jitter_ms = rand::rng().random_range(0..=raw_ms / 4 + 1);
        self.attempt += 1;
        Duration::from_millis(raw_ms.saturating_add(jitter_ms)).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_but_cap_at_max() {
        let policy = ExponentialReconnectionPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        };
        let mut schedule = policy.new_schedule();
        let mut last = Duration::ZERO;
        for _ in 0..10 {
            let delay = schedule.next_delay();
            assert!(delay <= Duration::from_millis(100));
            last = delay;
        }
        assert!(last <= Duration::from_millis(100));
    }
}
