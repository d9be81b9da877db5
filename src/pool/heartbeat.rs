//! Idle-probe heartbeat (spec.md §4.C "Heartbeat").
//!
//! Grounded on the teacher's `networking::health::heartbeat` idle-timer
//! pattern, narrowed to a single `OPTIONS`-frame probe per connection.

use crate::pool::connection::Connection;
use std::sync::Arc;
use std::time::Duration;

/// Returns `true` if `conn` has been idle long enough to warrant a probe.
/// `interval == Duration::ZERO` disables heartbeating entirely (spec.md §6
/// "0 disables").
pub fn should_probe(conn: &Connection, interval: Duration) -> bool {
    interval > Duration::ZERO && conn.idle_for() >= interval
}

/// Runs forever, probing `conn` on the configured interval. `send_options`
/// performs the actual `OPTIONS` round trip; on failure the connection is
/// torn down and `on_failure` is invoked so the owning dispatcher can
/// rebalance (spec.md "failure triggers immediate connection close and
/// pool re-balance").
pub async fn run_heartbeat<F, Fut, G>(conn: Arc<Connection>, interval: Duration, send_options: F, on_failure: G)
where
    F: Fn(Arc<Connection>) -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<()>>,
    G: Fn(Arc<Connection>),
{
    if interval == Duration::ZERO {
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if !should_probe(&conn, interval) {
            continue;
        }
        if let Err(e) = send_options(Arc::clone(&conn)).await {
            tracing::warn!(connection = conn.id, error = %e, "heartbeat probe failed, closing connection");
            conn.set_lifecycle(crate::pool::connection::ConnectionLifecycle::Closed);
            on_failure(conn);
            return;
        }
        conn.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolVersion;

    #[test]
    fn disabled_interval_never_probes() {
        let conn = Connection::new(1, ProtocolVersion::V4);
        assert!(!should_probe(&conn, Duration::ZERO));
    }

    #[test]
    fn fresh_connection_does_not_need_a_probe() {
        let conn = Connection::new(1, ProtocolVersion::V4);
        assert!(!should_probe(&conn, Duration::from_secs(30)));
    }
}
