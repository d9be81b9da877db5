//! Stream-id allocator acquire/release throughput under v3/v4 width.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wdb_driver::pool::StreamIdAllocator;
use wdb_driver::protocol::ProtocolVersion;

fn bench_acquire_release_cycle(c: &mut Criterion) {
    let alloc = StreamIdAllocator::new(ProtocolVersion::V4);
    c.bench_function("stream_id acquire+release v4", |b| {
        b.iter(|| {
            let id = alloc.acquire().unwrap();
            black_box(id);
            alloc.release(id);
        })
    });
}

fn bench_saturated_pool(c: &mut Criterion) {
    let alloc = StreamIdAllocator::new(ProtocolVersion::V4);
    let mut ids = Vec::new();
    for _ in 0..ProtocolVersion::V4.max_streams() - 1 {
        ids.push(alloc.acquire().unwrap());
    }
    c.bench_function("stream_id acquire+release near saturation", |b| {
        b.iter(|| {
            let id = alloc.acquire().unwrap();
            black_box(id);
            alloc.release(id);
        })
    });
    for id in ids {
        alloc.release(id);
    }
}

criterion_group!(benches, bench_acquire_release_cycle, bench_saturated_pool);
criterion_main!(benches);
