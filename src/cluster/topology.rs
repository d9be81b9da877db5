//! Cluster-wide host registry and token routing index (spec.md §3 "Cluster
//! metadata", §4.B "Metadata refresh").
//!
//! Grounded on the teacher's concurrent address-keyed maps
//! (`networking::discovery`/`membership` use `dashmap::DashMap` throughout)
//! generalized to the identity-stable `address → Host` contract this spec
//! requires.

use super::host::Host;
use crate::codec::CodecRegistry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

/// Debounces repeated refresh triggers into a single fetch per window
/// (spec.md §4.B "schema refresh is debounced").
struct Debounce {
    window: Duration,
    last_fired: AsyncMutex<Option<Instant>>,
}

impl Debounce {
    fn new(window: Duration) -> Self {
        Self { window, last_fired: AsyncMutex::new(None) }
    }

    /// Returns `true` if the caller should actually perform the refresh now
    /// (i.e. the debounce window has elapsed since the last fire).
    async fn should_fire(&self) -> bool {
        let mut last = self.last_fired.lock().await;
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Address-stable host registry plus the codec registry shared by every
/// session bound to this cluster handle (spec.md §5 "Shared resources").
pub struct ClusterMetadata {
    hosts: DashMap<SocketAddr, Arc<Host>>,
    /// Token-to-host routing index (spec.md §3 "a mapping address -> Host
    /// plus a token-to-host index for routing"). Populated alongside
    /// `Host::tokens` by `set_host_tokens` whenever the node-list refresh
    /// parses a peer's owned token ranges; read synchronously by
    /// `TokenAwarePolicy::plan` so building a host plan never has to await
    /// a per-host lock.
    token_index: DashMap<String, SocketAddr>,
    codecs: Arc<CodecRegistry>,
    node_refresh: Debounce,
    node_list_refresh: Debounce,
    schema_refresh: Debounce,
}

impl ClusterMetadata {
    pub fn new(
        codecs: Arc<CodecRegistry>,
        refresh_node_interval: Duration,
        refresh_node_list_interval: Duration,
        refresh_schema_interval: Duration,
    ) -> Self {
        Self {
            hosts: DashMap::new(),
            token_index: DashMap::new(),
            codecs,
            node_refresh: Debounce::new(refresh_node_interval),
            node_list_refresh: Debounce::new(refresh_node_list_interval),
            schema_refresh: Debounce::new(refresh_schema_interval),
        }
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    /// Returns the identity-stable `Host` for `address`, creating it on
    /// first sight (spec.md invariant 5: repeated lookups return the same
    /// object).
    pub fn get_or_insert_host(&self, address: SocketAddr) -> Arc<Host> {
        Arc::clone(self.hosts.entry(address).or_insert_with(|| Host::new(address)).value())
    }

    pub fn get_host(&self, address: &SocketAddr) -> Option<Arc<Host>> {
        self.hosts.get(address).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove_host(&self, address: &SocketAddr) -> Option<Arc<Host>> {
        self.token_index.retain(|_, owner| owner != address);
        self.hosts.remove(address).map(|(_, host)| host)
    }

    pub fn all_hosts(&self) -> Vec<Arc<Host>> {
        self.hosts.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Records that `address` owns `tokens`, updating both `Host::tokens`
    /// and the token-to-host routing index (spec.md §3). Replaces any
    /// tokens previously attributed to this host so a re-bootstrapped node
    /// doesn't keep stale entries in the index.
    pub async fn set_host_tokens(&self, address: SocketAddr, tokens: Vec<String>) {
        let Some(host) = self.get_host(&address) else { return };
        let mut current = host.tokens.lock().await;
        for stale in current.iter() {
            if self.token_index.get(stale).map(|e| *e.value()) == Some(address) {
                self.token_index.remove(stale);
            }
        }
        for token in &tokens {
            self.token_index.insert(token.clone(), address);
        }
        *current = tokens;
    }

    /// Looks up which host owns `token`'s range, if the index has seen it.
    pub fn token_owner(&self, token: &str) -> Option<SocketAddr> {
        self.token_index.get(token).map(|entry| *entry.value())
    }

    pub async fn maybe_refresh_single_node(&self) -> bool {
        self.node_refresh.should_fire().await
    }

    pub async fn maybe_refresh_node_list(&self) -> bool {
        self.node_list_refresh.should_fire().await
    }

    pub async fn maybe_refresh_schema(&self) -> bool {
        self.schema_refresh.should_fire().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn get_or_insert_is_identity_stable() {
        let meta = ClusterMetadata::new(
            Arc::new(CodecRegistry::with_primitives()),
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let a = meta.get_or_insert_host(addr(9042));
        let b = meta.get_or_insert_host(addr(9042));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn debounce_suppresses_rapid_refires() {
        let meta = ClusterMetadata::new(
            Arc::new(CodecRegistry::with_primitives()),
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        assert!(meta.maybe_refresh_schema().await);
        assert!(!meta.maybe_refresh_schema().await);
    }

    #[tokio::test]
    async fn set_host_tokens_updates_index_and_reassigns_on_overlap() {
        let meta = ClusterMetadata::new(
            Arc::new(CodecRegistry::with_primitives()),
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let host_a = meta.get_or_insert_host(addr(9042));
        let host_b = meta.get_or_insert_host(addr(9043));

        meta.set_host_tokens(host_a.address, vec!["t1".into(), "t2".into()]).await;
        assert_eq!(meta.token_owner("t1"), Some(host_a.address));
        assert_eq!(meta.token_owner("t2"), Some(host_a.address));
        assert_eq!(*host_a.tokens.lock().await, vec!["t1".to_string(), "t2".to_string()]);

        // A later refresh reassigns "t2" to host_b; host_a's entry for it
        // must be pruned rather than left stale.
        meta.set_host_tokens(host_b.address, vec!["t2".into()]).await;
        assert_eq!(meta.token_owner("t2"), Some(host_b.address));

        meta.set_host_tokens(host_a.address, vec!["t1".into()]).await;
        assert_eq!(meta.token_owner("t1"), Some(host_a.address));
        assert_eq!(meta.token_owner("t2"), Some(host_b.address));
    }
}
