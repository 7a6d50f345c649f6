use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use dishrec::{
    ClusterAssigner, ClusterAssignment, ClusterIndexBuilder, DishMetadata, DistanceMetric,
    EngineConfig, RecommendationEngine, StubEmbedder, VectorCatalog,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIMENSION: usize = 384;
const CLUSTERS: usize = 3;

fn random_unit(rng: &mut StdRng) -> Vec<f32> {
    let mut v: Vec<f32> = (0..DIMENSION).map(|_| rng.random_range(-1.0f32..1.0)).collect();
    dishrec::l2_normalize_in_place(&mut v);
    v
}

fn catalog(size: usize, rng: &mut StdRng) -> Arc<VectorCatalog> {
    let vectors = (0..size).map(|_| random_unit(rng)).collect();
    let metadata = (0..size)
        .map(|i| DishMetadata {
            name: format!("dish-{i}"),
            description: String::new(),
            image_url: format!("https://img.example/{i}.jpg"),
            ingredients: String::new(),
            category: String::new(),
        })
        .collect();
    Arc::new(VectorCatalog::load(vectors, metadata).expect("catalog"))
}

fn assigner(rng: &mut StdRng) -> ClusterAssigner {
    let centroids = (0..CLUSTERS).map(|_| random_unit(rng)).collect();
    ClusterAssigner::new(centroids, DistanceMetric::Euclidean).expect("centroids")
}

fn bench_search(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let mut group = c.benchmark_group("cluster_search");

    for size in [1_000usize, 10_000, 50_000] {
        let catalog = catalog(size, &mut rng);
        let assigner = assigner(&mut rng);
        let assignment =
            Arc::new(ClusterAssignment::compute(&catalog, &assigner).expect("assignment"));
        let builder = ClusterIndexBuilder::new(catalog, assignment, DistanceMetric::Euclidean);
        let query = random_unit(&mut rng);

        let serial = builder
            .clone()
            .with_parallel_threshold(usize::MAX)
            .build_all();
        let parallel = builder.with_parallel_threshold(1).build_all();
        let Some(cluster) = serial.available().next() else {
            continue;
        };

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("serial", size), &query, |b, query| {
            let index = serial.get(cluster).expect("index");
            b.iter(|| index.search(black_box(query), 5).expect("search"))
        });
        group.bench_with_input(BenchmarkId::new("parallel", size), &query, |b, query| {
            let index = parallel.get(cluster).expect("index");
            b.iter(|| index.search(black_box(query), 5).expect("search"))
        });
    }

    group.finish();
}

fn bench_recommend(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let engine = RecommendationEngine::new(
        catalog(10_000, &mut rng),
        assigner(&mut rng),
        None,
        Arc::new(StubEmbedder::new(DIMENSION, "stub")),
        EngineConfig::default(),
    )
    .expect("engine");

    let mut group = c.benchmark_group("recommend");
    for texts in [1usize, 4, 16] {
        let query: Vec<String> = (0..texts).map(|i| format!("ingredient {i}")).collect();
        group.bench_with_input(BenchmarkId::new("texts", texts), &query, |b, query| {
            let mut draw = StdRng::seed_from_u64(3);
            b.iter(|| engine.recommend_with_rng(black_box(query.as_slice()), &mut draw))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_search, bench_recommend);
criterion_main!(benches);
