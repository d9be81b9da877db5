//! Bounded waiter queue for borrow requests when every connection in the
//! pool is stream-exhausted and the pool is already at `max` (spec.md §4.C
//! "Queue overflow returns NoHostAvailable/BusyPool").
//!
//! Grounded on the teacher's `pool::connection::wait_queue::WaitQueue`
//! shape (bounded `VecDeque` behind an async mutex with a notify signal).

use crate::error::{DbError, Result};
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};

pub struct WaitQueue {
    waiters: Mutex<VecDeque<()>>,
    notify: Notify,
    max_size: usize,
}

impl WaitQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            max_size,
        }
    }

    /// Parks the caller until notified, failing immediately with `BusyPool`
    /// if the queue is already at capacity.
    pub async fn wait(&self) -> Result<()> {
        {
            let mut waiters = self.waiters.lock().await;
            if waiters.len() >= self.max_size {
                return Err(DbError::BusyPool(format!(
                    "wait queue full: {} >= {}",
                    waiters.len(),
                    self.max_size
                )));
            }
            waiters.push_back(());
        }
        self.notify.notified().await;
        let mut waiters = self.waiters.lock().await;
        waiters.pop_front();
        Ok(())
    }

    /// Wakes one parked waiter (called when a stream-id or connection slot
    /// frees up).
    pub fn notify_one(&self) {
        self.notify.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.waiters.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn overflow_returns_busy_pool() {
        let queue = Arc::new(WaitQueue::new(1));
        let q2 = Arc::clone(&queue);
        let first = tokio::spawn(async move { q2.wait().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = queue.wait().await;
        assert!(matches!(second, Err(DbError::BusyPool(_))));
        queue.notify_one();
        first.await.unwrap().unwrap();
    }
}
