//! A single pooled connection: stream-id allocation, in-flight accounting
//! and lifecycle state (spec.md §3 "Connection", §4.C "Stream-id
//! allocation").
//!
//! Grounded on the teacher's `pool::connection::lifecycle::ConnectionState`
//! enum shape, narrowed to the four states this spec names, plus a bitset
//! stream-id allocator in the style of the teacher's statement-cache/guard
//! pattern in `pool::connection::core`.

use crate::error::{DbError, Result};
use crate::pool::request::{RawResponse, Request};
use crate::protocol::ProtocolVersion;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLifecycle {
    Init,
    Open,
    Trashed,
    Closed,
}

/// A fixed-width bitset tracking which stream-ids are currently allocated.
/// Width is 128 for v1/v2, 32,768 for v3/v4 (spec.md §3).
pub struct StreamIdAllocator {
    words: Vec<AtomicU64Wrapper>,
    width: usize,
}

struct AtomicU64Wrapper(std::sync::atomic::AtomicU64);

impl StreamIdAllocator {
    pub fn new(version: ProtocolVersion) -> Self {
        let width = version.max_streams();
        let word_count = width.div_ceil(64);
        let words = (0..word_count).map(|_| AtomicU64Wrapper(std::sync::atomic::AtomicU64::new(0))).collect();
        Self { words, width }
    }

    /// Atomically flips the first free bit and returns its index, or `None`
    /// if the connection is stream-exhausted.
    pub fn acquire(&self) -> Option<i16> {
        for (word_idx, word) in self.words.iter().enumerate() {
            loop {
                let current = word.0.load(Ordering::Acquire);
                if current == u64::MAX {
                    break;
                }
                let bit = (!current).trailing_zeros() as usize;
                let global_id = word_idx * 64 + bit;
                if global_id >= self.width {
                    break;
                }
                let mask = 1u64 << bit;
                if word
                    .0
                    .compare_exchange(current, current | mask, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return Some(global_id as i16);
                }
                // Lost the race; retry within this word.
            }
        }
        None
    }

    pub fn release(&self, stream_id: i16) {
        let global_id = stream_id as usize;
        let word_idx = global_id / 64;
        let bit = global_id % 64;
        if let Some(word) = self.words.get(word_idx) {
            word.0.fetch_and(!(1u64 << bit), Ordering::AcqRel);
        }
    }

    pub fn in_flight(&self) -> u32 {
        self.words.iter().map(|w| w.0.load(Ordering::Acquire).count_ones()).sum()
    }
}

/// One pooled TCP connection. Owns the pending-request table keyed by
/// stream-id and the allocator guarding that keyspace.
pub struct Connection {
    pub id: u64,
    lifecycle: Mutex<ConnectionLifecycle>,
    stream_ids: StreamIdAllocator,
    pending: DashMap<i16, Request>,
    in_flight: AtomicUsize,
    last_activity: Mutex<Instant>,
    /// Guards the write half so frames from different requests don't
    /// interleave on the wire.
    pub write_lock: AsyncMutex<()>,
    reservation_counter: AtomicI64,
}

impl Connection {
    pub fn new(id: u64, version: ProtocolVersion) -> Self {
        Self {
            id,
            lifecycle: Mutex::new(ConnectionLifecycle::Init),
            stream_ids: StreamIdAllocator::new(version),
            pending: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            last_activity: Mutex::new(Instant::now()),
            write_lock: AsyncMutex::new(()),
            reservation_counter: AtomicI64::new(0),
        }
    }

    pub fn lifecycle(&self) -> ConnectionLifecycle {
        *self.lifecycle.lock()
    }

    pub fn set_lifecycle(&self, state: ConnectionLifecycle) {
        *self.lifecycle.lock() = state;
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Reserves a slot before allocating a stream-id, per spec.md §4.C
    /// "the pool increments a reservation counter atomically before
    /// allocating a stream-id to avoid over-subscription races".
    pub fn reserve(&self) {
        self.reservation_counter.fetch_add(1, Ordering::AcqRel);
    }

    pub fn unreserve(&self) {
        self.reservation_counter.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn reserved_count(&self) -> i64 {
        self.reservation_counter.load(Ordering::Acquire)
    }

    /// Allocates a stream-id and registers `request` under it, or hands
    /// `request` back alongside `BusyConnection` if the connection is
    /// stream-exhausted so the caller can retry it elsewhere.
    pub fn submit(&self, request: Request) -> std::result::Result<i16, (DbError, Request)> {
        let Some(stream_id) = self.stream_ids.acquire() else {
            return Err((DbError::BusyConnection("no free stream-id on this connection".into()), request));
        };
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.pending.insert(stream_id, request);
        Ok(stream_id)
    }

    /// Completes and reclaims `stream_id`, releasing its in-flight slot
    /// exactly once regardless of whether a response or a cancellation won
    /// the race (spec.md §4.D "release the connection's in-flight slot
    /// exactly once").
    pub fn complete(&self, stream_id: i16, result: Result<RawResponse>) {
        if let Some((_, mut request)) = self.pending.remove(&stream_id) {
            request.complete(result);
            self.stream_ids.release(stream_id);
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Fails every still-pending request on this connection with
    /// `ConnectionException` (spec.md §4.C "Failure propagation") and
    /// drains the in-flight counter to zero.
    pub fn fail_all_pending(&self, reason: &str) {
        let stream_ids: Vec<i16> = self.pending.iter().map(|entry| *entry.key()).collect();
        for stream_id in stream_ids {
            self.complete(stream_id, Err(DbError::ConnectionException(reason.to_string())));
        }
    }

    pub fn stream_id_in_flight(&self) -> u32 {
        self.stream_ids.in_flight()
    }
}
