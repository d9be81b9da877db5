//! S6 — Retry on Unavailable: a single `Unavailable` response from the first
//! host causes exactly one subsequent attempt on the next host in the plan.

use async_trait::async_trait;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wdb_driver::cluster::Host;
use wdb_driver::error::{DbError, Result};
use wdb_driver::execution::{CancellationToken, ConnectionSource, DefaultRetryPolicy, NoSpeculativeExecutionPolicy, QueryState};
use wdb_driver::pool::{Connection, HostDispatcher, PoolSizing, RawResponse};
use wdb_driver::protocol::{Compression, Opcode};

struct FlakyFirstHost {
    attempts: AtomicUsize,
    dispatchers: std::collections::HashMap<SocketAddr, Arc<HostDispatcher>>,
}

#[async_trait]
impl ConnectionSource for FlakyFirstHost {
    fn dispatcher_for(&self, host: &Host) -> Option<Arc<HostDispatcher>> {
        self.dispatchers.get(&host.address).cloned()
    }

    async fn send(&self, conn: &Arc<Connection>, stream_id: i16, _opcode: Opcode, _body: BytesMut, _compression: Compression) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt == 0 {
            conn.complete(stream_id, Err(DbError::UnavailableException("not enough replicas".into())));
        } else {
            conn.complete(stream_id, Ok(RawResponse { opcode: Opcode::Result, body: BytesMut::new() }));
        }
        Ok(())
    }
}

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

fn sizing() -> PoolSizing {
    PoolSizing { core: 1, max: 2, max_requests_per_connection: 10 }
}

#[tokio::test]
async fn unavailable_on_first_host_retries_exactly_once_on_next_host() {
    let host_a = Host::new(addr(9042));
    let host_b = Host::new(addr(9043));

    let mut dispatchers = std::collections::HashMap::new();
    dispatchers.insert(host_a.address, Arc::new(HostDispatcher::new(host_a.address, Default::default(), sizing(), 8)));
    dispatchers.insert(host_b.address, Arc::new(HostDispatcher::new(host_b.address, Default::default(), sizing(), 8)));

    let connections = FlakyFirstHost { attempts: AtomicUsize::new(0), dispatchers };

    let mut plan = wdb_driver::execution::HostPlan::new();
    plan.push_back(host_a);
    plan.push_back(host_b);

    let state = QueryState {
        max_retries: 1,
        timeout: Duration::from_secs(1),
        tracing: false,
        retry_policy: Arc::new(DefaultRetryPolicy),
        speculative_policy: Arc::new(NoSpeculativeExecutionPolicy),
    };

    let result = state
        .execute(plan, Opcode::Query, BytesMut::new(), Compression::None, &connections, CancellationToken::new())
        .await;

    assert!(result.is_ok(), "expected eventual success on the second host, got {result:?}");
    assert_eq!(connections.attempts.load(Ordering::SeqCst), 2, "exactly one retry should have occurred");
}
