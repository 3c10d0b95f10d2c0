//! Sparse max pooling over a regular-mode rulebook

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::allocator::{alloc_filled, alloc_vec};
use crate::runtime::cpu::CpuClient;
use crate::sparse::Rulebook;
use crate::tensor::FeatureMatrix;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

const NO_ROUTE: u32 = u32::MAX;

/// Per-channel maximum over every input paired with an output site
///
/// Output rows with no pairs stay zero. Each output row reduces its inputs in
/// canonical pair order, so ties and NaN propagation are reproducible. Rows
/// are independent and reduced in parallel.
pub fn max_pool_forward<T: Element>(
    client: &CpuClient,
    features: &FeatureMatrix<T>,
    rulebook: &Rulebook,
) -> Result<FeatureMatrix<T>> {
    let n_in = rulebook.input_sites().len();
    let n_out = rulebook.output_sites().len();
    let c = features.cols();
    if features.rows() != n_in {
        return Err(Error::shape_mismatch(&[n_in, c], &features.shape()));
    }
    rulebook.validate_sizes(n_in, n_out)?;

    let span = tracing::debug_span!("max_pool_forward", n_in, n_out, channels = c);
    let _guard = span.enter();

    let windows = PoolWindows::new(rulebook, n_out)?;
    let x = features.as_slice();
    let mut out = FeatureMatrix::zeros(n_out, c)?;
    for_each_output_chunk(client, out.as_mut_slice(), c, |first, chunk| {
        for (r, dst) in chunk.chunks_exact_mut(c).enumerate() {
            let mut inputs = windows.inputs(first + r).iter().map(|&i| i as usize);
            let Some(i) = inputs.next() else {
                continue;
            };
            dst.copy_from_slice(&x[i * c..(i + 1) * c]);
            for i in inputs {
                for (d, &v) in dst.iter_mut().zip(&x[i * c..(i + 1) * c]) {
                    if v > *d {
                        *d = v;
                    }
                }
            }
        }
    });
    Ok(out)
}

/// Gradient of [`max_pool_forward`] with respect to its input
///
/// Each `(output site, channel)` gradient goes to exactly one input: the
/// first one, in canonical pair order, whose value equals the pooled
/// maximum. `output` must be the result of the forward pass. Routes are
/// found in parallel per output row; the scatter into the input gradient
/// is serial in output order.
pub fn max_pool_backward<T: Element>(
    client: &CpuClient,
    features: &FeatureMatrix<T>,
    output: &FeatureMatrix<T>,
    grad_output: &FeatureMatrix<T>,
    rulebook: &Rulebook,
) -> Result<FeatureMatrix<T>> {
    let n_in = rulebook.input_sites().len();
    let n_out = rulebook.output_sites().len();
    let c = features.cols();
    if features.rows() != n_in {
        return Err(Error::shape_mismatch(&[n_in, c], &features.shape()));
    }
    if output.shape() != [n_out, c] {
        return Err(Error::shape_mismatch(&[n_out, c], &output.shape()));
    }
    if grad_output.shape() != [n_out, c] {
        return Err(Error::shape_mismatch(&[n_out, c], &grad_output.shape()));
    }
    rulebook.validate_sizes(n_in, n_out)?;

    let span = tracing::debug_span!("max_pool_backward", n_in, n_out, channels = c);
    let _guard = span.enter();

    let windows = PoolWindows::new(rulebook, n_out)?;
    let (x, y) = (features.as_slice(), output.as_slice());
    let mut routes = alloc_filled(n_out * c, NO_ROUTE)?;
    for_each_output_chunk(client, &mut routes, c, |first, chunk| {
        for (r, route) in chunk.chunks_exact_mut(c).enumerate() {
            let o = first + r;
            let inputs = windows.inputs(o);
            for (ch, slot) in route.iter_mut().enumerate() {
                let target = y[o * c + ch];
                if let Some(&i) = inputs.iter().find(|&&i| x[i as usize * c + ch] == target) {
                    *slot = i;
                }
            }
        }
    });

    let mut grad_acc = alloc_filled(n_in * c, T::acc_zero())?;
    let dy = grad_output.as_slice();
    for (slot, &i) in routes.iter().enumerate() {
        if i == NO_ROUTE {
            continue;
        }
        let g = &mut grad_acc[i as usize * c + slot % c];
        *g = *g + dy[slot].to_acc();
    }

    let mut grad = alloc_vec(n_in * c)?;
    grad.extend(grad_acc.iter().map(|&v| T::from_acc(v)));
    FeatureMatrix::from_vec(grad, n_in, c)
}

/// Inputs pooled into each output row, grouped by output in canonical pair order
struct PoolWindows {
    starts: Vec<usize>,
    inputs: Vec<u32>,
}

impl PoolWindows {
    fn new(rulebook: &Rulebook, n_out: usize) -> Result<Self> {
        let mut starts = alloc_filled(n_out + 1, 0usize)?;
        for pairs in rulebook.all_pairs() {
            for &o in pairs.output() {
                starts[o as usize + 1] += 1;
            }
        }
        for o in 0..n_out {
            starts[o + 1] += starts[o];
        }

        let mut cursor = starts.clone();
        let mut inputs = alloc_filled(starts[n_out], 0u32)?;
        for pairs in rulebook.all_pairs() {
            for (&i, &o) in pairs.input().iter().zip(pairs.output()) {
                let at = &mut cursor[o as usize];
                inputs[*at] = i;
                *at += 1;
            }
        }
        Ok(Self { starts, inputs })
    }

    #[inline]
    fn inputs(&self, o: usize) -> &[u32] {
        &self.inputs[self.starts[o]..self.starts[o + 1]]
    }
}

/// Run `f(first_row, rows)` over row chunks of a `cols`-wide buffer
fn for_each_output_chunk<U, F>(client: &CpuClient, buf: &mut [U], cols: usize, f: F)
where
    U: Send,
    F: Fn(usize, &mut [U]) + Sync,
{
    if cols == 0 {
        return;
    }

    #[cfg(feature = "rayon")]
    {
        let min_len = client.rayon_min_len();
        if !client.is_sequential() && buf.len() / cols > min_len {
            client.install_parallelism(|| {
                buf.par_chunks_mut(min_len * cols)
                    .enumerate()
                    .for_each(|(chunk, rows)| f(chunk * min_len, rows));
            });
            return;
        }
    }

    #[cfg(not(feature = "rayon"))]
    let _ = client;

    f(0, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ConvGeometry;
    use crate::sparse::{ConvMode, CoordinateSet, build_rulebook};
    use std::sync::Arc;

    fn pool_1d(xs: &[i32]) -> Rulebook {
        let indices: Vec<i32> = xs.iter().flat_map(|&x| [0, x]).collect();
        let sites = Arc::new(CoordinateSet::new(indices, [8], 1).unwrap());
        let geometry = ConvGeometry::uniform(1, 2, 2, 0, 1);
        build_rulebook(&CpuClient::new(), &sites, &geometry, ConvMode::Regular).unwrap()
    }

    #[test]
    fn test_max_pool_forward() {
        let client = CpuClient::new();
        // windows {0,1}, {4,5}, {6}
        let rb = pool_1d(&[0, 1, 4, 5, 6]);
        let x = FeatureMatrix::from_slice(
            &[1.0f32, -1.0, 3.0, -2.0, -5.0, 0.5, -4.0, 0.25, 2.0, 2.0],
            5,
            2,
        )
        .unwrap();
        let y = max_pool_forward(&client, &x, &rb).unwrap();
        assert_eq!(y.shape(), [3, 2]);
        assert_eq!(y.as_slice(), &[3.0, -1.0, -4.0, 0.5, 2.0, 2.0]);
    }

    #[test]
    fn test_max_pool_backward_routes_to_first_max() {
        let client = CpuClient::new();
        let rb = pool_1d(&[0, 1]);
        // both inputs tie in channel 0
        let x = FeatureMatrix::from_slice(&[2.0f64, 1.0, 2.0, 3.0], 2, 2).unwrap();
        let y = max_pool_forward(&client, &x, &rb).unwrap();
        let dy = FeatureMatrix::from_slice(&[10.0f64, 20.0], 1, 2).unwrap();
        let dx = max_pool_backward(&client, &x, &y, &dy, &rb).unwrap();
        assert_eq!(dx.as_slice(), &[10.0, 0.0, 0.0, 20.0]);
    }

    #[test]
    fn test_max_pool_identical_across_threads() {
        use crate::runtime::ParallelismConfig;

        // 64 windows of two sites each, with ties in every other window
        let xs: Vec<i32> = (0..128).collect();
        let indices: Vec<i32> = xs.iter().flat_map(|&x| [0, x]).collect();
        let sites = Arc::new(CoordinateSet::new(indices, [128], 1).unwrap());
        let geometry = ConvGeometry::uniform(1, 2, 2, 0, 1);
        let values: Vec<f64> = (0..256).map(|v| ((v * 7) % 5) as f64).collect();
        let x = FeatureMatrix::from_vec(values, 128, 2).unwrap();
        let dy = FeatureMatrix::from_vec((0..128).map(|v| v as f64).collect(), 64, 2).unwrap();

        let sequential = CpuClient::new().with_parallelism(ParallelismConfig::sequential());
        let threaded = CpuClient::new().with_parallelism(ParallelismConfig::new(Some(4), Some(1)));
        let rb = build_rulebook(&sequential, &sites, &geometry, ConvMode::Regular).unwrap();

        let y_seq = max_pool_forward(&sequential, &x, &rb).unwrap();
        let y_par = max_pool_forward(&threaded, &x, &rb).unwrap();
        assert_eq!(y_seq, y_par);
        let dx_seq = max_pool_backward(&sequential, &x, &y_seq, &dy, &rb).unwrap();
        let dx_par = max_pool_backward(&threaded, &x, &y_par, &dy, &rb).unwrap();
        assert_eq!(dx_seq, dx_par);

        // every output gradient is routed exactly once
        let total: f64 = dx_seq.as_slice().iter().sum();
        assert_eq!(total, dy.as_slice().iter().sum::<f64>());
    }

    #[test]
    fn test_max_pool_backward_shape_checks() {
        let client = CpuClient::new();
        let rb = pool_1d(&[0, 1]);
        let x = FeatureMatrix::from_slice(&[2.0f64, 1.0, 2.0, 3.0], 2, 2).unwrap();
        let y = max_pool_forward(&client, &x, &rb).unwrap();
        let dy = FeatureMatrix::from_slice(&[10.0f64], 1, 1).unwrap();
        assert!(max_pool_backward(&client, &x, &y, &dy, &rb).is_err());
    }
}
