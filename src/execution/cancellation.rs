//! Cooperative cancellation primitive shared between a query's attempts
//! (spec.md §4.D "Cancellation", §5 "cooperative cancellation with atomic
//! flags").
//!
//! Grounded on the teacher's shutdown-flag pattern in
//! `networking::health::shutdown` (an `Arc<AtomicBool>` checked at
//! yield-points rather than a hard abort).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Signals cancellation. Idempotent; returns `true` the first time it
    /// actually flips the flag (spec.md "the losing attempt's completion is
    /// a no-op, not an error").
    pub fn cancel(&self) -> bool {
        self.cancelled.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent_but_reports_first_winner() {
        let token = CancellationToken::new();
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn clone_shares_the_same_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
