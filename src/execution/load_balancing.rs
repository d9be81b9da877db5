//! Host-plan generation (spec.md §4.D "Load balancing").
//!
//! Grounded on the teacher's `networking::loadbalancer::policy` trait shape
//! (a policy producing an ordered iterator of candidates per call), adapted
//! to this spec's `Host`/`Distance` model.

use crate::cluster::{ClusterMetadata, Distance, Host};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Produces an ordered sequence of hosts to try for one query. Iteration
/// order is the "host plan" the request handler walks (spec.md §4.D).
pub type HostPlan = VecDeque<Arc<Host>>;

pub trait LoadBalancingPolicy: Send + Sync {
    /// Classifies `host` for pooling purposes (spec.md §4.C "core/max sizing
    /// per Distance").
    fn distance(&self, host: &Host) -> Distance;

    /// Builds the ordered plan of hosts to attempt, given current metadata
    /// and (when known) the routing key's token.
    fn plan(&self, metadata: &ClusterMetadata, routing_token: Option<&str>) -> HostPlan;
}

/// Round-robins across every host not classified `Ignored`, rotating the
/// starting point on each call (spec.md §4.D "round robin").
pub struct RoundRobinPolicy {
    cursor: AtomicUsize,
}

impl Default for RoundRobinPolicy {
    fn default() -> Self {
        Self { cursor: AtomicUsize::new(0) }
    }
}

impl LoadBalancingPolicy for RoundRobinPolicy {
    fn distance(&self, _host: &Host) -> Distance {
        Distance::Local
    }

    fn plan(&self, metadata: &ClusterMetadata, _routing_token: Option<&str>) -> HostPlan {
        let mut hosts = metadata.all_hosts();
        if hosts.is_empty() {
            return VecDeque::new();
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % hosts.len();
        hosts.rotate_left(start);
        hosts.into_iter().filter(|h| self.distance(h) != Distance::Ignored).collect()
    }
}

/// Prefers the host(s) owning `routing_token`'s range, falling back to
/// round robin for the remainder of the plan (spec.md §4.D "token-aware
/// routing prefers replicas, falls back to round robin").
pub struct TokenAwarePolicy {
    fallback: RoundRobinPolicy,
}

impl Default for TokenAwarePolicy {
    fn default() -> Self {
        Self { fallback: RoundRobinPolicy::default() }
    }
}

impl LoadBalancingPolicy for TokenAwarePolicy {
    fn distance(&self, host: &Host) -> Distance {
        self.fallback.distance(host)
    }

    fn plan(&self, metadata: &ClusterMetadata, routing_token: Option<&str>) -> HostPlan {
        let mut hosts = metadata.all_hosts();
        if hosts.is_empty() {
            return VecDeque::new();
        }
        if let Some(token) = routing_token {
            hosts.sort_by_key(|h| !owns_token(metadata, h, token));
        }
        let start = self.fallback.cursor.fetch_add(1, Ordering::Relaxed) % hosts.len();
        hosts.rotate_left(start);
        hosts.into_iter().filter(|h| self.distance(h) != Distance::Ignored).collect()
    }
}

/// True if `metadata`'s token-to-host index attributes `token`'s range to
/// `host` (spec.md §3 "a token-to-host index for routing", §4.D
/// "token-aware routing prefers replicas"). Hosts the index hasn't learned
/// about yet (no node-list refresh has run, or the token is unassigned)
/// never match, so `plan` falls back to its round-robin ordering.
fn owns_token(metadata: &ClusterMetadata, host: &Host, token: &str) -> bool {
    metadata.token_owner(token) == Some(host.address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecRegistry;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn metadata_with_hosts(n: u16) -> ClusterMetadata {
        let meta = ClusterMetadata::new(
            Arc::new(CodecRegistry::with_primitives()),
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        for i in 0..n {
            meta.get_or_insert_host(addr(9042 + i));
        }
        meta
    }

    #[test]
    fn round_robin_rotates_starting_point() {
        let meta = metadata_with_hosts(3);
        let policy = RoundRobinPolicy::default();
        let first = policy.plan(&meta, None);
        let second = policy.plan(&meta, None);
        assert_eq!(first.len(), 3);
        assert_ne!(first.front().unwrap().address, second.front().unwrap().address);
    }

    #[test]
    fn empty_metadata_produces_empty_plan() {
        let meta = metadata_with_hosts(0);
        let policy = RoundRobinPolicy::default();
        assert!(policy.plan(&meta, None).is_empty());
    }

    #[tokio::test]
    async fn token_aware_plan_prefers_the_owning_host() {
        let meta = metadata_with_hosts(3);
        let owner = addr(9044);
        meta.set_host_tokens(owner, vec!["t1".into()]).await;

        let policy = TokenAwarePolicy::default();
        let plan = policy.plan(&meta, Some("t1"));
        assert_eq!(plan.front().unwrap().address, owner);
    }

    #[tokio::test]
    async fn token_aware_plan_without_a_known_owner_falls_back_to_round_robin() {
        let meta = metadata_with_hosts(3);
        let policy = TokenAwarePolicy::default();
        let plan = policy.plan(&meta, Some("unassigned-token"));
        assert_eq!(plan.len(), 3);
    }
}
