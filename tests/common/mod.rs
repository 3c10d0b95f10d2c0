//! Common test utilities
#![allow(dead_code)]

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use spconv::ops::ConvGeometry;
use spconv::runtime::ParallelismConfig;
use spconv::runtime::cpu::CpuClient;
use spconv::sparse::SparseConvTensor;
use spconv::tensor::{DenseTensor, FeatureMatrix};

/// Create a CPU client for testing
pub fn create_cpu_client() -> CpuClient {
    CpuClient::new()
}

/// Create a single-threaded CPU client
pub fn create_sequential_client() -> CpuClient {
    CpuClient::new().with_parallelism(ParallelismConfig::sequential())
}

/// Create a CPU client with a dedicated pool and tiny task chunks
pub fn create_threaded_client(threads: usize) -> CpuClient {
    CpuClient::new().with_parallelism(ParallelismConfig::new(Some(threads), Some(1)))
}

/// Seeded RNG so failures are reproducible
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert two f32 slices are close within tolerance
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Random sparse tensor: every cell is active with probability `density`
///
/// Features are drawn from `[-1, 1)`. At least one site is always active.
pub fn random_sparse(
    rng: &mut StdRng,
    batch_size: usize,
    spatial: &[usize],
    channels: usize,
    density: f64,
) -> SparseConvTensor<f64> {
    let volume: usize = spatial.iter().product();
    let mut indices = Vec::new();
    let mut values = Vec::new();
    for cell in 0..batch_size * volume {
        let first = indices.is_empty() && cell + 1 == batch_size * volume;
        if !first && !rng.gen_bool(density) {
            continue;
        }
        let (b, pos) = (cell / volume, unravel(cell % volume, spatial));
        indices.push(b as i32);
        indices.extend(pos.iter().map(|&p| p as i32));
        values.extend((0..channels).map(|_| rng.gen_range(-1.0..1.0)));
    }
    let rows = values.len() / channels;
    let features = FeatureMatrix::from_vec(values, rows, channels).unwrap();
    SparseConvTensor::new(features, indices, spatial, batch_size).unwrap()
}

/// Random weight `[kernel_volume, c_in, c_out]` with entries in `[-1, 1)`
pub fn random_weight(
    rng: &mut StdRng,
    geometry: &ConvGeometry,
    c_in: usize,
    c_out: usize,
) -> DenseTensor<f64> {
    let kv = geometry.kernel_volume();
    let data: Vec<f64> = (0..kv * c_in * c_out)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    DenseTensor::from_vec(data, [kv, c_in, c_out]).unwrap()
}

/// Row-major multi-index of `flat` within `shape`
pub fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut out = vec![0; shape.len()];
    for d in (0..shape.len()).rev() {
        out[d] = flat % shape[d];
        flat /= shape[d];
    }
    out
}

fn ravel(pos: &[usize], shape: &[usize]) -> usize {
    pos.iter().zip(shape).fold(0, |acc, (&p, &s)| acc * s + p)
}

/// Dense reference convolution on a channels-last array
///
/// `input` is `[batch, *spatial, c_in]`, `weight` is `[kernel_volume, c_in,
/// c_out]` with kernel offsets in row-major order. Returns the output
/// spatial shape and the `[batch, *out_spatial, c_out]` data.
pub fn dense_conv_reference(
    input: &[f64],
    batch_size: usize,
    spatial: &[usize],
    c_in: usize,
    weight: &[f64],
    c_out: usize,
    geometry: &ConvGeometry,
) -> (Vec<usize>, Vec<f64>) {
    let ndim = spatial.len();
    let out_spatial: Vec<usize> = (0..ndim)
        .map(|d| {
            let span = geometry.dilation[d] * (geometry.kernel_size[d] - 1) + 1;
            (spatial[d] + 2 * geometry.padding[d] - span) / geometry.stride[d] + 1
        })
        .collect();
    let in_volume: usize = spatial.iter().product();
    let out_volume: usize = out_spatial.iter().product();
    let kernel = geometry.kernel_size.to_vec();
    let kv = geometry.kernel_volume();

    let mut out = vec![0.0; batch_size * out_volume * c_out];
    for b in 0..batch_size {
        for o in 0..out_volume {
            let opos = unravel(o, &out_spatial);
            for k in 0..kv {
                let kpos = unravel(k, &kernel);
                let ipos: Option<Vec<usize>> = (0..ndim)
                    .map(|d| {
                        let i = (opos[d] * geometry.stride[d] + kpos[d] * geometry.dilation[d])
                            as i64
                            - geometry.padding[d] as i64;
                        (i >= 0 && (i as usize) < spatial[d]).then_some(i as usize)
                    })
                    .collect();
                let Some(ipos) = ipos else { continue };
                let irow = (b * in_volume + ravel(&ipos, spatial)) * c_in;
                let orow = (b * out_volume + o) * c_out;
                for ci in 0..c_in {
                    let x = input[irow + ci];
                    for co in 0..c_out {
                        out[orow + co] += x * weight[(k * c_in + ci) * c_out + co];
                    }
                }
            }
        }
    }
    (out_spatial, out)
}

/// Dense reference transposed convolution on a channels-last array
///
/// Every input cell `i` adds `x[i] * w[k]` to output cell
/// `i * stride - padding + k * dilation` when it lies in range.
pub fn dense_transposed_reference(
    input: &[f64],
    batch_size: usize,
    spatial: &[usize],
    c_in: usize,
    weight: &[f64],
    c_out: usize,
    geometry: &ConvGeometry,
) -> (Vec<usize>, Vec<f64>) {
    let ndim = spatial.len();
    let out_spatial: Vec<usize> = (0..ndim)
        .map(|d| {
            (spatial[d] - 1) * geometry.stride[d] + geometry.dilation[d] * (geometry.kernel_size[d] - 1)
                + 1
                - 2 * geometry.padding[d]
        })
        .collect();
    let in_volume: usize = spatial.iter().product();
    let out_volume: usize = out_spatial.iter().product();
    let kernel = geometry.kernel_size.to_vec();
    let kv = geometry.kernel_volume();

    let mut out = vec![0.0; batch_size * out_volume * c_out];
    for b in 0..batch_size {
        for i in 0..in_volume {
            let ipos = unravel(i, spatial);
            for k in 0..kv {
                let kpos = unravel(k, &kernel);
                let opos: Option<Vec<usize>> = (0..ndim)
                    .map(|d| {
                        let o = (ipos[d] * geometry.stride[d] + kpos[d] * geometry.dilation[d])
                            as i64
                            - geometry.padding[d] as i64;
                        (o >= 0 && (o as usize) < out_spatial[d]).then_some(o as usize)
                    })
                    .collect();
                let Some(opos) = opos else { continue };
                let irow = (b * in_volume + i) * c_in;
                let orow = (b * out_volume + ravel(&opos, &out_spatial)) * c_out;
                for ci in 0..c_in {
                    let x = input[irow + ci];
                    for co in 0..c_out {
                        out[orow + co] += x * weight[(k * c_in + ci) * c_out + co];
                    }
                }
            }
        }
    }
    (out_spatial, out)
}

/// Sum of elementwise products
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
