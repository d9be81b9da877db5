//! Control channel and cluster-wide topology tracker (spec.md §4.B).
//!
//! `Cluster` is the singleton-per-cluster owner of the control channel and
//! the shared codec registry (spec.md §5 "Shared resources": "The codec
//! registry is shared across all sessions bound to the same cluster
//! handle").

pub mod control_connection;
pub mod host;
pub mod reconnection;
pub mod topology;

pub use host::{Distance, Host, HostState};
pub use reconnection::{ExponentialReconnectionPolicy, ReconnectionPolicy};
pub use topology::ClusterMetadata;

use crate::codec::CodecRegistry;
use crate::protocol::events::ServerEvent;
use crate::protocol::{Compression, ProtocolVersion};
use control_connection::{drive_control_connection, ControlConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// The "new-node delay": debounce before probing a newly announced node
/// (spec.md §4.B "TOPOLOGY_CHANGE ... debounced by a configurable
/// new-node delay").
pub struct Cluster {
    pub metadata: Arc<ClusterMetadata>,
    new_node_delay: Duration,
    _control_task: tokio::task::JoinHandle<()>,
}

impl Cluster {
    /// Connects the control channel against `seed_addresses`, spawns the
    /// event-demultiplexing/reconnection background task, and returns a
    /// handle whose `metadata` stays current as events arrive.
    pub fn connect(
        seed_addresses: Vec<SocketAddr>,
        protocol_version: ProtocolVersion,
        compression: Compression,
        reconnection_policy: Arc<dyn ReconnectionPolicy>,
        refresh_node_interval: Duration,
        refresh_node_list_interval: Duration,
        refresh_schema_interval: Duration,
        new_node_delay: Duration,
    ) -> Arc<Self> {
        let codecs = Arc::new(CodecRegistry::with_primitives());
        let metadata = Arc::new(ClusterMetadata::new(
            codecs,
            refresh_node_interval,
            refresh_node_list_interval,
            refresh_schema_interval,
        ));
        for address in &seed_addresses {
            metadata.get_or_insert_host(*address);
        }

        let (control, events_rx) = ControlConnection::new(protocol_version, compression);
        let control_task = tokio::spawn(drive_control_connection(
            Arc::clone(&control),
            seed_addresses,
            Arc::clone(&reconnection_policy),
        ));

        let dispatch_metadata = Arc::clone(&metadata);
        tokio::spawn(dispatch_events(dispatch_metadata, events_rx, new_node_delay));

        Arc::new(Self {
            metadata,
            new_node_delay,
            _control_task: control_task,
        })
    }

    pub fn new_node_delay(&self) -> Duration {
        self.new_node_delay
    }
}

/// Applies server-pushed events to `metadata` (spec.md §4.B "Event
/// demultiplexing"): status changes flip host state (suppressing
/// idempotent re-announcements and managing the reconnection slot),
/// topology changes register/remove hosts after the new-node delay, schema
/// changes trigger a debounced metadata refresh.
async fn dispatch_events(
    metadata: Arc<ClusterMetadata>,
    mut events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    new_node_delay: Duration,
) {
    while let Some(event) = events_rx.recv().await {
        match event {
            ServerEvent::StatusChange { kind, address } => {
                let host = metadata.get_or_insert_host(address);
                let new_state = match kind {
                    crate::protocol::StatusChangeType::Up => HostState::Up,
                    crate::protocol::StatusChangeType::Down => HostState::Down,
                };
                let changed = host.set_state(new_state).await;
                if changed && new_state == HostState::Down {
                    host.try_claim_reconnection();
                } else if changed && new_state == HostState::Up {
                    host.clear_reconnection();
                }
            }
            ServerEvent::TopologyChange { kind, address } => {
                tracing::info!(?kind, %address, delay_ms = new_node_delay.as_millis(), "topology change observed");
                tokio::time::sleep(new_node_delay).await;
                match kind {
                    crate::protocol::TopologyChangeType::NewNode => {
                        metadata.get_or_insert_host(address);
                    }
                    crate::protocol::TopologyChangeType::RemovedNode => {
                        metadata.remove_host(&address);
                    }
                    crate::protocol::TopologyChangeType::MovedNode => {
                        metadata.get_or_insert_host(address);
                    }
                }
                metadata.maybe_refresh_node_list().await;
            }
            ServerEvent::SchemaChange { .. } => {
                if metadata.maybe_refresh_schema().await {
                    tracing::debug!("schema refresh triggered by SCHEMA_CHANGE event");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_down_then_up_clears_reconnection_slot() {
        let codecs = Arc::new(CodecRegistry::with_primitives());
        let metadata = Arc::new(ClusterMetadata::new(
            codecs,
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let address: SocketAddr = "127.0.0.1:9042".parse().unwrap();

        let dispatch_meta = Arc::clone(&metadata);
        let handle = tokio::spawn(dispatch_events(dispatch_meta, rx, Duration::from_millis(0)));

        tx.send(ServerEvent::StatusChange {
            kind: crate::protocol::StatusChangeType::Down,
            address,
        })
        .unwrap();
        // Give the task a turn to process.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let host = metadata.get_host(&address).unwrap();
        assert_eq!(host.state().await, HostState::Down);
        assert!(host.reconnection_pending());

        tx.send(ServerEvent::StatusChange {
            kind: crate::protocol::StatusChangeType::Up,
            address,
        })
        .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(host.state().await, HostState::Up);
        assert!(!host.reconnection_pending());

        drop(tx);
        let _ = handle.await;
    }
}
