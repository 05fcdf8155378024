//! Benchmarks for the hot paths of recall: vector distance and temporal
//! rescoring. Run with: cargo bench -p mnemosyne-core

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mnemosyne_core::temporal::{decayed_score, DecayInputs, DecayParameters};
use mnemosyne_core::vector_math::{cosine_similarity, euclidean_distance};

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..1536).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..1536).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_1536d", |bench| {
        bench.iter(|| black_box(cosine_similarity(&a, &b).unwrap()));
    });
}

fn bench_euclidean_distance(c: &mut Criterion) {
    let a: Vec<f32> = (0..1536).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..1536).map(|i| (i as f32).cos()).collect();

    c.bench_function("euclidean_distance_1536d", |bench| {
        bench.iter(|| black_box(euclidean_distance(&a, &b).unwrap()));
    });
}

fn bench_brute_force_scan(c: &mut Criterion) {
    let query: Vec<f32> = (0..256).map(|i| (i as f32).sin()).collect();
    let corpus: Vec<Vec<f32>> = (0..1000)
        .map(|seed| (0..256).map(|j| ((seed * 256 + j) as f32).cos()).collect())
        .collect();

    c.bench_function("brute_force_scan_1000x256d", |bench| {
        bench.iter(|| {
            let mut scores: Vec<f32> = corpus
                .iter()
                .map(|v| cosine_similarity(&query, v).unwrap())
                .collect();
            scores.sort_by(|x, y| y.partial_cmp(x).unwrap());
            black_box(scores.first().copied())
        });
    });
}

fn bench_decayed_score(c: &mut Criterion) {
    let params = DecayParameters {
        importance_weight: 0.5,
        frequency_weight: 0.2,
        emotional_weight: 0.3,
        base_decay_rate: 1.0 / 30.0,
    };
    let now = Utc::now();
    let inputs = DecayInputs {
        created_at: now - chrono::Duration::days(30),
        last_accessed_at: now - chrono::Duration::days(2),
        access_count: 5,
        confidence: 0.9,
        importance: 0.7,
        emotional_weight: Some(0.3),
    };

    c.bench_function("decayed_score", |bench| {
        bench.iter(|| black_box(decayed_score(&inputs, &params, now)));
    });
}

criterion_group!(
    benches,
    bench_cosine_similarity,
    bench_euclidean_distance,
    bench_brute_force_scan,
    bench_decayed_score,
);
criterion_main!(benches);
