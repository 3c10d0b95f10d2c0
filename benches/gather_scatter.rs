#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spconv::prelude::*;
use std::collections::HashSet;

fn random_tensor(side: usize, count: usize, channels: usize, seed: u64) -> SparseConvTensor<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(count);
    let mut indices = Vec::with_capacity(count * 4);
    while seen.len() < count {
        let c: [i32; 3] = [
            rng.gen_range(0..side as i32),
            rng.gen_range(0..side as i32),
            rng.gen_range(0..side as i32),
        ];
        if seen.insert(c) {
            indices.extend_from_slice(&[0, c[0], c[1], c[2]]);
        }
    }
    let values: Vec<f32> = (0..count * channels).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let features = FeatureMatrix::from_vec(values, count, channels).unwrap();
    SparseConvTensor::new(features, indices, [side, side, side], 1).unwrap()
}

fn random_weight(kv: usize, c_in: usize, c_out: usize, seed: u64) -> DenseTensor<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..kv * c_in * c_out).map(|_| rng.gen_range(-0.1..0.1)).collect();
    DenseTensor::from_vec(data, [kv, c_in, c_out]).unwrap()
}

fn bench_submanifold_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("submanifold_forward");
    let client = CpuClient::new();
    let geometry = ConvGeometry::submanifold(3, 3);

    for channels in [16usize, 32, 64] {
        let x = random_tensor(64, 20_000, channels, 3);
        let w = random_weight(27, channels, channels, 5);
        // warm the rulebook cache so only gather-matmul-scatter is timed
        client.submanifold_conv(&x, &w, None, &geometry, "subm").unwrap();

        group.throughput(Throughput::Elements(x.num_active() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(channels), &channels, |b, _| {
            b.iter(|| {
                let y = client.submanifold_conv(&x, &w, None, &geometry, "subm").unwrap();
                black_box(y.num_active());
            });
        });
    }

    group.finish();
}

fn bench_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("submanifold_backward");
    let client = CpuClient::new();
    let geometry = ConvGeometry::submanifold(3, 3);
    let x = random_tensor(64, 20_000, 32, 9);
    let w = random_weight(27, 32, 32, 10);
    let y = client.submanifold_conv(&x, &w, None, &geometry, "subm").unwrap();
    let rb = client
        .get_or_build_rulebook(&x, &geometry, ConvMode::Submanifold, "subm")
        .unwrap();

    group.throughput(Throughput::Elements(x.num_active() as u64));
    group.bench_function("c32", |b| {
        b.iter(|| {
            let grads = client.sparse_conv_backward(&x, &w, y.features(), &rb).unwrap();
            black_box(grads.1.numel());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_submanifold_forward, bench_backward);
criterion_main!(benches);
