//! Codec registry lookup/synthesis throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wdb_driver::codec::{CodecRegistry, WireType};

fn bench_primitive_lookup(c: &mut Criterion) {
    let registry = CodecRegistry::with_primitives();
    c.bench_function("codec_for_wire int", |b| {
        b.iter(|| {
            let codec = registry.codec_for_wire(black_box(&WireType::Int)).unwrap();
            black_box(codec);
        })
    });
}

fn bench_list_synthesis_cold(c: &mut Criterion) {
    c.bench_function("codec_for_wire list<int> cold", |b| {
        b.iter(|| {
            let registry = CodecRegistry::with_primitives();
            let wire = WireType::list(WireType::Int);
            let codec = registry.codec_for_wire(black_box(&wire)).unwrap();
            black_box(codec);
        })
    });
}

fn bench_list_synthesis_cached(c: &mut Criterion) {
    let registry = CodecRegistry::with_primitives();
    let wire = WireType::list(WireType::Int);
    registry.codec_for_wire(&wire).unwrap();
    c.bench_function("codec_for_wire list<int> cached", |b| {
        b.iter(|| {
            let codec = registry.codec_for_wire(black_box(&wire)).unwrap();
            black_box(codec);
        })
    });
}

criterion_group!(benches, bench_primitive_lookup, bench_list_synthesis_cold, bench_list_synthesis_cached);
criterion_main!(benches);
