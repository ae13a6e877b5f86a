use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use helm::engine::SoftEngine;
use helm::prelude::*;

fn low_tier(scheme: Scheme, seed: u64) -> Orchestrator {
    let mut helm = Orchestrator::with_engine(Arc::new(SoftEngine::with_seed(seed)));
    helm.initialize(scheme, &preset_for(SecurityTier::Low)).unwrap();
    helm.generate_keys().unwrap();
    helm
}

fn keygen(c: &mut Criterion) {
    let mut helm = low_tier(Scheme::Integer, 0);

    c.bench_function("keygen_public_secret", |b| b.iter(|| helm.generate_keys().unwrap()));

    c.bench_function("keygen_relin", |b| {
        b.iter(|| helm.generate_relin_keys(RelinKeyOptions::default()).unwrap())
    });
}

fn integer_pipeline(c: &mut Criterion) {
    let helm = low_tier(Scheme::Integer, 1);
    let values: Vec<i64> = (0..4096).collect();

    c.bench_function("bfv_encrypt_4096", |b| {
        b.iter(|| helm.encrypt(black_box(values.clone())).unwrap())
    });

    let cipher_text = helm.encrypt(values).unwrap();
    c.bench_function("bfv_decrypt_4096", |b| {
        b.iter(|| helm.decrypt(black_box(&cipher_text)).unwrap())
    });
}

fn real_pipeline(c: &mut Criterion) {
    let helm = low_tier(Scheme::ApproxReal, 2);
    let values: Vec<f64> = (0..4096).map(|i| i as f64 / 4096.0).collect();

    c.bench_function("ckks_encrypt_4096", |b| {
        b.iter(|| helm.encrypt(black_box(values.clone())).unwrap())
    });

    let cipher_text = helm.encrypt(values).unwrap();
    c.bench_function("ckks_decrypt_4096", |b| {
        b.iter(|| helm.decrypt(black_box(&cipher_text)).unwrap())
    });
}

fn key_serialization(c: &mut Criterion) {
    let helm = low_tier(Scheme::Integer, 3);

    c.bench_function("save_public_key_deflate", |b| b.iter(|| helm.save_public_key().unwrap()));

    c.bench_function("save_public_key_raw", |b| {
        b.iter(|| helm.save_key_with(KeyKind::Public, ComprMode::None).unwrap())
    });
}

criterion_group!(benches, keygen, integer_pipeline, real_pipeline, key_serialization);
criterion_main!(benches);
