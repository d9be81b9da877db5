//! S2 — Race between response and cancellation: 2,000 requests are
//! submitted to a single connection and each is completed either by a
//! simulated response or by a cancellation firing concurrently; once the
//! workload quiesces, the connection's in-flight counter is 0.

use std::sync::Arc;
use wdb_driver::pool::{Connection, RawResponse};
use wdb_driver::protocol::{Compression, Opcode, ProtocolVersion};

#[tokio::test]
async fn two_thousand_queries_leave_in_flight_at_zero_after_cancellation_races() {
    let conn = Arc::new(Connection::new(1, ProtocolVersion::V4));
    let mut handles = Vec::with_capacity(2_000);

    for i in 0..2_000usize {
        let (request, rx) = wdb_driver::pool::Request::new(Opcode::Query, bytes::BytesMut::new(), Compression::None, false);
        let stream_id = conn.submit(request).unwrap();
        let conn = Arc::clone(&conn);

        let responder = tokio::spawn(async move {
            // Half the workload "arrives" normally, half races a
            // cancellation that wins by completing first.
            if i % 2 == 0 {
                tokio::time::sleep(std::time::Duration::from_micros(50)).await;
                conn.complete(stream_id, Ok(RawResponse { opcode: Opcode::Result, body: bytes::BytesMut::new() }));
            } else {
                conn.complete(stream_id, Err(wdb_driver::error::DbError::Cancelled));
                // The "real" response arrives later and finds the stream-id
                // already reclaimed; completing it again must be a no-op.
                tokio::time::sleep(std::time::Duration::from_micros(50)).await;
                conn.complete(stream_id, Ok(RawResponse { opcode: Opcode::Result, body: bytes::BytesMut::new() }));
            }
        });
        handles.push((responder, rx));
    }

    for (responder, rx) in handles {
        responder.await.unwrap();
        let _ = rx.await;
    }

    assert_eq!(conn.in_flight_count(), 0);
    assert_eq!(conn.stream_id_in_flight(), 0);
}
