use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use termweb_client::delta::checksum::{adaptive_block_size, compute_checksums};
use termweb_client::delta::apply::{apply_delta, encode_ops, DeltaOp};

fn bench_compute_checksums(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_checksums");

    for file_size in [64 * 1024usize, 1024 * 1024, 16 * 1024 * 1024].iter() {
        let content = vec![0x5Au8; *file_size];
        let block_size = adaptive_block_size(*file_size as u64);

        group.bench_with_input(BenchmarkId::from_parameter(file_size), file_size, |b, _| {
            b.iter(|| compute_checksums(black_box(&content), black_box(block_size)));
        });
    }
    group.finish();
}

fn bench_apply_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_delta");

    for span_count in [10usize, 100, 1000].iter() {
        let cached = vec![0x7Bu8; span_count * 64];
        let mut ops = Vec::with_capacity(*span_count);
        for i in 0..*span_count {
            ops.push(DeltaOp::Copy { cached_offset: (i * 64) as u64, length: 32 });
            ops.push(DeltaOp::Literal { bytes: vec![0x11u8; 32].into() });
        }
        let encoded = encode_ops(&ops);

        group.bench_with_input(BenchmarkId::from_parameter(span_count), span_count, |b, _| {
            b.iter(|| apply_delta(black_box(&cached), black_box(&encoded)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compute_checksums, bench_apply_delta);
criterion_main!(benches);
