use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use dejaview::codec::{Vector, VectorCodec};
use dejaview::hamming::{hamming, hamming_naive, inner_product};
use dejaview::segment::IndexKind;
use dejaview::shard::{ShardConfig, ShardManager};
use rand::prelude::*;

fn random_vectors(rng: &mut StdRng, kind: IndexKind, n: usize) -> Vec<Vector> {
    let codec = VectorCodec::new(kind);
    (0..n)
        .map(|_| match kind {
            IndexKind::Binary { bits } => {
                let mut bytes = vec![0u8; bits / 8];
                rng.fill_bytes(&mut bytes);
                codec.encode_binary_bytes(&bytes).unwrap()
            }
            IndexKind::Float { dim } => {
                let values = (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect::<Vec<_>>();
                codec.encode_dense(&values).unwrap()
            }
        })
        .collect()
}

fn bench_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("Distance");
    let mut rng = StdRng::seed_from_u64(0);
    let mut src = vec![0u8; 8];
    let mut dst = vec![0u8; 8 << 16];
    rng.fill_bytes(&mut src);
    rng.fill_bytes(&mut dst);
    group.throughput(Throughput::Elements((dst.len() / 8) as u64));

    group.bench_function("hamming_naive", |b| {
        b.iter(|| dst.chunks_exact(8).map(|x| hamming_naive(black_box(&src), x)).sum::<u32>())
    });
    group.bench_function("hamming", |b| {
        b.iter(|| dst.chunks_exact(8).map(|x| hamming(black_box(&src), x)).sum::<u32>())
    });

    let va = (0..768).map(|_| rng.random::<f32>()).collect::<Vec<_>>();
    let vb = (0..768).map(|_| rng.random::<f32>()).collect::<Vec<_>>();
    group.throughput(Throughput::Elements(1));
    group.bench_function("inner_product_768", |b| b.iter(|| inner_product(black_box(&va), &vb)));
    group.finish();
}

fn bench_shard_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("ShardSearch");
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    for (kind, n) in [(IndexKind::Binary { bits: 64 }, 200_000), (IndexKind::Float { dim: 768 }, 20_000)] {
        let vectors = random_vectors(&mut rng, kind, n);
        let query = random_vectors(&mut rng, kind, 1).remove(0);
        group.throughput(Throughput::Elements(n as u64));

        for max_vectors in [n, n / 8] {
            let config = ShardConfig::new(dir.path(), kind.name(), kind)
                .max_vectors(max_vectors)
                .persist_on_seal(false);
            let mut shard = ShardManager::create(config);
            for (i, v) in vectors.iter().enumerate() {
                shard.add(v, &i.to_string()).unwrap();
            }
            let id = BenchmarkId::new(kind.name(), format!("{} segments", shard.segments().len()));
            group.bench_with_input(id, &query, |b, q| b.iter(|| shard.search(q, 1).unwrap()));
        }
    }
    group.finish();
}

criterion_group!(benches, bench_distance, bench_shard_search);
criterion_main!(benches);
