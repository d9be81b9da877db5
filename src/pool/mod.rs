//! Per-host connection pool / dispatcher (spec.md §4.C).

pub mod connection;
pub mod heartbeat;
pub mod request;
pub mod resize;
pub mod wait_queue;

pub use connection::{Connection, ConnectionLifecycle, StreamIdAllocator};
pub use request::{RawResponse, Request};
pub use resize::ResizeDecision;
pub use wait_queue::WaitQueue;

use crate::cluster::Distance;
use crate::error::{DbError, Result};
use crate::protocol::ProtocolVersion;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct PoolSizing {
    pub core: usize,
    pub max: usize,
    pub max_requests_per_connection: usize,
}

impl PoolSizing {
    pub fn for_distance(distance: Distance, local: PoolSizing, remote: PoolSizing) -> Option<PoolSizing> {
        match distance {
            Distance::Local => Some(local),
            Distance::Remote => Some(remote),
            Distance::Ignored => None,
        }
    }
}

/// One per host: owns the connection set and multiplexes borrow requests
/// across it (spec.md §4.C).
pub struct HostDispatcher {
    pub address: SocketAddr,
    protocol_version: ProtocolVersion,
    sizing: PoolSizing,
    connections: RwLock<Vec<Arc<Connection>>>,
    wait_queue: WaitQueue,
    next_id: AtomicU64,
}

impl HostDispatcher {
    pub fn new(address: SocketAddr, protocol_version: ProtocolVersion, sizing: PoolSizing, max_wait_queue: usize) -> Self {
        Self {
            address,
            protocol_version,
            sizing,
            connections: RwLock::new(Vec::new()),
            wait_queue: WaitQueue::new(max_wait_queue),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.connections.read().len()
    }

    pub fn total_in_flight(&self) -> usize {
        self.connections.read().iter().map(|c| c.in_flight_count()).sum()
    }

    /// Creates a fresh connection entry (the caller is responsible for
    /// actually dialing the TCP stream and driving its read loop — this
    /// method only registers the bookkeeping object).
    pub fn add_connection(&self) -> Arc<Connection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(Connection::new(id, self.protocol_version));
        conn.set_lifecycle(ConnectionLifecycle::Open);
        self.connections.write().push(Arc::clone(&conn));
        conn
    }

    /// Least-loaded borrow policy (spec.md §4.C "Borrow policy"): the
    /// connection with the smallest in-flight count wins; ties broken by
    /// insertion order (first found in iteration order, since
    /// `connections` is append-only).
    pub fn borrow(&self) -> Option<Arc<Connection>> {
        let connections = self.connections.read();
        connections
            .iter()
            .filter(|c| c.lifecycle() == ConnectionLifecycle::Open)
            .min_by_key(|c| c.reserved_count())
            .cloned()
    }

    /// Borrows a connection and submits `request`, growing the pool or
    /// parking on the wait queue as needed. Mirrors spec.md's "Stream-id
    /// allocation" + "Borrow policy" contracts together.
    pub async fn dispatch(&self, mut request: Request) -> Result<(Arc<Connection>, i16)> {
        loop {
            if let Some(conn) = self.borrow() {
                conn.reserve();
                match conn.submit(request) {
                    Ok(stream_id) => {
                        conn.unreserve();
                        return Ok((conn, stream_id));
                    }
                    Err((_busy, returned)) => {
                        conn.unreserve();
                        // stream-exhausted on the least-loaded connection; try to grow.
                        request = returned;
                    }
                }
            }

            if self.pool_size() < self.sizing.max {
                self.add_connection();
                continue;
            }

            self.wait_queue.wait().await?;
        }
    }

    /// Resize check per spec.md §4.C "Resize"; returns what the caller
    /// (the background pool-maintenance task) should do next.
    pub fn resize_decision(&self, grow_threshold: f64, trash_threshold: f64) -> ResizeDecision {
        resize::decide(
            self.total_in_flight(),
            self.pool_size(),
            self.sizing.core,
            self.sizing.max,
            self.sizing.max_requests_per_connection,
            grow_threshold,
            trash_threshold,
        )
    }

    /// Moves a connection out of rotation without closing it; it continues
    /// to drain its in-flight responses but never accepts new borrows
    /// (spec.md "Trashed connections never accept new borrows").
    pub fn trash_one(&self) -> Option<Arc<Connection>> {
        let connections = self.connections.read();
        let trashed = connections
            .iter()
            .filter(|c| c.lifecycle() == ConnectionLifecycle::Open)
            .max_by_key(|c| c.id)
            .cloned();
        if let Some(ref conn) = trashed {
            conn.set_lifecycle(ConnectionLifecycle::Trashed);
        }
        trashed
    }

    /// On connection close: fail every pending request so the request
    /// handler can retry on another host, remove it from the pool, and
    /// wake up anyone waiting for capacity (spec.md §4.C "Failure
    /// propagation").
    pub fn on_connection_closed(&self, conn_id: u64) {
        let removed = {
            let mut connections = self.connections.write();
            let pos = connections.iter().position(|c| c.id == conn_id);
            pos.map(|i| connections.remove(i))
        };
        if let Some(conn) = removed {
            conn.set_lifecycle(ConnectionLifecycle::Closed);
            conn.fail_all_pending("connection closed");
        }
        self.wait_queue.notify_one();
    }

    pub fn notify_waiters(&self) {
        self.wait_queue.notify_one();
    }
}
