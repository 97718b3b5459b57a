use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use shoal_prolly_tree::{DagCborCodec, Entry, Tree, TreeConfig, Update};
use shoal_storage::{Blake3Hasher, MemoryBlockStore};

const BENCH_SEED: u64 = 42;

fn bench_entries(count: u64, rng: &mut StdRng) -> Vec<Entry> {
    (0..count)
        .map(|index| {
            let mut hash = [0u8; 8];
            rng.fill(&mut hash);
            Entry::new(index as i64, hash.to_vec(), index.to_be_bytes().to_vec())
        })
        .collect()
}

fn bench_insert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential");
    let mut rng = StdRng::seed_from_u64(BENCH_SEED);

    for size in [10, 100, 1000, 10000] {
        let entries = bench_entries(size, &mut rng);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(tokio::runtime::Runtime::new().unwrap())
                .iter(|| async {
                    let store = MemoryBlockStore::default();
                    let mut tree = Tree::<DagCborCodec, Blake3Hasher, _>::empty(
                        store,
                        TreeConfig::default(),
                    )
                    .await
                    .unwrap();

                    for entry in entries.iter() {
                        tree.insert(entry.clone()).await.unwrap();
                    }
                });
        });
    }

    group.finish();
}

fn bench_insert_batched(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_batched");
    let mut rng = StdRng::seed_from_u64(BENCH_SEED);

    for size in [10, 100, 1000, 10000] {
        let entries = bench_entries(size, &mut rng);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(tokio::runtime::Runtime::new().unwrap())
                .iter(|| async {
                    let store = MemoryBlockStore::default();
                    let mut tree = Tree::<DagCborCodec, Blake3Hasher, _>::empty(
                        store,
                        TreeConfig::default(),
                    )
                    .await
                    .unwrap();

                    tree.apply(entries.iter().cloned().map(Update::Add).collect())
                        .await
                        .unwrap();
                });
        });
    }

    group.finish();
}

fn bench_insert_shuffled(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_shuffled");
    let mut rng = StdRng::seed_from_u64(BENCH_SEED);

    for size in [10, 100, 1000] {
        let mut entries = bench_entries(size, &mut rng);
        entries.shuffle(&mut rng);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(tokio::runtime::Runtime::new().unwrap())
                .iter(|| async {
                    let store = MemoryBlockStore::default();
                    let mut tree = Tree::<DagCborCodec, Blake3Hasher, _>::empty(
                        store,
                        TreeConfig::default(),
                    )
                    .await
                    .unwrap();

                    for entry in entries.iter() {
                        tree.insert(entry.clone()).await.unwrap();
                    }
                });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sequential,
    bench_insert_batched,
    bench_insert_shuffled
);
criterion_main!(benches);
