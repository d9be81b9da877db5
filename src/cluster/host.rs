//! Per-host identity and state machine (spec.md §3 "Host", §4.B invariants).
//!
//! Grounded on the teacher's per-connection lifecycle state enum
//! (`pool::connection::lifecycle::ConnectionState`) and its fairness
//! primitives, generalized here to a per-host state machine serialized by a
//! `tokio::sync::Mutex` (FIFO-fair by construction, matching the "per-host
//! fairness-ordered mutex" design note in spec.md §5).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Added,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Distance {
    Local,
    Remote,
    Ignored,
}

/// A cluster peer. Identity is the socket address (spec.md §3 "equality is
/// address equality") — `PartialEq`/`Hash` are therefore implemented purely
/// on `address`, never on the mutable fields.
#[derive(Debug)]
pub struct Host {
    pub address: SocketAddr,
    pub listen_address: Option<SocketAddr>,
    pub datacenter: Mutex<Option<String>>,
    pub rack: Mutex<Option<String>>,
    pub server_version: Mutex<Option<String>>,
    pub tokens: Mutex<Vec<String>>,
    state: Mutex<HostState>,
    /// Single-slot pending-reconnection handle (spec.md invariant 6: "at
    /// most one in-flight reconnection per host").
    reconnection_pending: AtomicBool,
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}
impl Eq for Host {}

impl std::hash::Hash for Host {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl Host {
    pub fn new(address: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            address,
            listen_address: None,
            datacenter: Mutex::new(None),
            rack: Mutex::new(None),
            server_version: Mutex::new(None),
            tokens: Mutex::new(Vec::new()),
            state: Mutex::new(HostState::Added),
            reconnection_pending: AtomicBool::new(false),
        })
    }

    pub async fn state(&self) -> HostState {
        *self.state.lock().await
    }

    /// Applies a state transition, returning `true` iff the state actually
    /// changed (spec.md §4.B "idempotent notifications are suppressed").
    pub async fn set_state(&self, new_state: HostState) -> bool {
        let mut guard = self.state.lock().await;
        if *guard == new_state {
            return false;
        }
        tracing::info!(address = %self.address, from = ?*guard, to = ?new_state, "host state transition");
        *guard = new_state;
        true
    }

    /// Attempts to claim the single pending-reconnection slot. Returns
    /// `true` if this call claimed it (i.e. no reconnection was already
    /// pending).
    pub fn try_claim_reconnection(&self) -> bool {
        self.reconnection_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn clear_reconnection(&self) {
        self.reconnection_pending.store(false, Ordering::Release);
    }

    pub fn reconnection_pending(&self) -> bool {
        self.reconnection_pending.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[tokio::test]
    async fn identical_address_hosts_are_equal() {
        let a = Host::new(addr(9042));
        let b = Host::new(addr(9042));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn idempotent_state_transition_reports_no_change() {
        let host = Host::new(addr(9042));
        assert!(host.set_state(HostState::Up).await);
        assert!(!host.set_state(HostState::Up).await);
        assert!(host.set_state(HostState::Down).await);
    }

    #[tokio::test]
    async fn only_one_reconnection_claim_succeeds_at_a_time() {
        let host = Host::new(addr(9042));
        assert!(host.try_claim_reconnection());
        assert!(!host.try_claim_reconnection());
        host.clear_reconnection();
        assert!(host.try_claim_reconnection());
    }
}
