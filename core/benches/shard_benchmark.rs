use criterion::{Criterion, criterion_group, criterion_main};
use fleet_rs::WorkerInfo;
use fleet_rs::data::{DistributedSampler, Sampler, ShardExt, TailPolicy};
use std::hint::black_box;

fn benchmark_shard(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard");

    // 1M samples across 8 ranks; every rank walks the whole stream.
    let len = 1_000_000u64;
    let worker = WorkerInfo::new(3, 8).unwrap();

    group.bench_function("iter_keep_1m_8", |b| {
        b.iter(|| black_box((0..len).shard(worker).sum::<u64>()))
    });

    group.bench_function("iter_drop_uneven_1m_8", |b| {
        b.iter(|| {
            black_box(
                (0..len)
                    .shard_with(worker, TailPolicy::DropUneven)
                    .sum::<u64>(),
            )
        })
    });

    // Index-based alternative for datasets with random access.
    let sampler = DistributedSampler::new(worker).shuffle(true).seed(7);
    group.bench_function("sampler_shuffle_1m_8", |b| {
        b.iter(|| black_box(sampler.sample(len as usize).len()))
    });

    group.finish();
}

criterion_group!(benches, benchmark_shard);
criterion_main!(benches);
