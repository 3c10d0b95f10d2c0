//! Gather-matmul-scatter convolution, forward and backward

use super::for_each_row_chunk;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::conv_common::{validate_bias_length, validate_weight};
use crate::runtime::allocator::{alloc_filled, alloc_vec, alloc_zeroed};
use crate::runtime::cpu::CpuClient;
use crate::runtime::cpu::kernels::{
    gather_rows_kernel, matmul_acc_kernel, matmul_at_acc_kernel, matmul_bt_acc_kernel,
    scatter_add_rows_kernel,
};
use crate::sparse::Rulebook;
use crate::tensor::{DenseTensor, FeatureMatrix};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Sparse convolution forward pass
///
/// `features` is `[N_in, C_in]` with rows aligned to the rulebook's input
/// sites, `weight` is `[*kernel_size, C_in, C_out]` or
/// `[kernel_volume, C_in, C_out]` in canonical offset order and `bias` is
/// `[C_out]`. Returns `[N_out, C_out]` aligned to the output sites.
///
/// # Errors
///
/// - `ShapeMismatch` / `ChannelMismatch` for inconsistent operands, checked
///   before any compute
/// - `Integrity` if the rulebook references a site outside the operands
pub fn gather_scatter_forward<T: Element>(
    client: &CpuClient,
    features: &FeatureMatrix<T>,
    rulebook: &Rulebook,
    weight: &DenseTensor<T>,
    bias: Option<&DenseTensor<T>>,
) -> Result<FeatureMatrix<T>> {
    const OP: &str = "gather_scatter_forward";

    let (c_in, c_out) = validate_weight(weight.shape(), rulebook.geometry(), features.cols(), OP)?;
    if let Some(bias) = bias {
        validate_bias_length(bias.shape(), c_out, OP)?;
    }
    let n_in = rulebook.input_sites().len();
    let n_out = rulebook.output_sites().len();
    if features.rows() != n_in {
        return Err(Error::shape_mismatch(&[n_in, c_in], &features.shape()));
    }
    rulebook.validate_sizes(n_in, n_out)?;

    let span = tracing::debug_span!(
        "gather_scatter_forward",
        mode = %rulebook.mode(),
        n_in,
        n_out,
        c_in,
        c_out,
        pairs = rulebook.total_pairs()
    );
    let _guard = span.enter();

    let mut acc = alloc_filled(n_out * c_out, T::acc_zero())?;

    if c_in > 0 && c_out > 0 {
        let max_pairs = rulebook.max_pairs();
        let mut gathered: Vec<T> = alloc_zeroed(max_pairs * c_in)?;
        let mut products = alloc_filled(max_pairs * c_out, T::acc_zero())?;
        let x = features.as_slice();
        let w_len = c_in * c_out;

        for (offset, pairs) in rulebook.all_pairs().iter().enumerate() {
            if pairs.is_empty() {
                continue;
            }
            let w_k = &weight.as_slice()[offset * w_len..(offset + 1) * w_len];
            for_each_row_chunk(
                client,
                pairs.input(),
                &mut gathered,
                c_in,
                &mut products,
                c_out,
                |rows, g, o| {
                    gather_rows_kernel(x, c_in, rows, g);
                    o.fill(T::acc_zero());
                    matmul_acc_kernel(g, w_k, o, rows.len(), c_out, c_in);
                },
            );
            scatter_add_rows_kernel(
                &products[..pairs.len() * c_out],
                c_out,
                pairs.output(),
                &mut acc,
            );
        }
    }

    let mut out = alloc_vec(n_out * c_out)?;
    match bias {
        Some(bias) => {
            let b = bias.as_slice();
            for row in acc.chunks_exact(c_out.max(1)) {
                out.extend(
                    row.iter()
                        .zip(b)
                        .map(|(&v, &bv)| T::from_acc(v + bv.to_acc())),
                );
            }
        }
        None => out.extend(acc.iter().map(|&v| T::from_acc(v))),
    }

    tracing::debug!(n_out, "sparse convolution forward done");
    FeatureMatrix::from_vec(out, n_out, c_out)
}

/// Sparse convolution backward pass
///
/// Returns `(grad_input, grad_weight, grad_bias)`:
///
/// - `grad_input[N_in, C_in]`: the mirrored gather-scatter, gathering output
///   gradients by output index, multiplying by each weight slice transposed
///   and scatter-adding by input index
/// - `grad_weight`: same shape as `weight`; slice `k` is
///   `gathered_input^T @ gathered_grad_output` over offset `k`'s pairs
/// - `grad_bias[C_out]`: column sum of `grad_output`
///
/// Weight-gradient slices are independent and computed in parallel over
/// offsets. The input gradient follows the forward accumulation order.
pub fn gather_scatter_backward<T: Element>(
    client: &CpuClient,
    features: &FeatureMatrix<T>,
    rulebook: &Rulebook,
    weight: &DenseTensor<T>,
    grad_output: &FeatureMatrix<T>,
) -> Result<(FeatureMatrix<T>, DenseTensor<T>, DenseTensor<T>)> {
    const OP: &str = "gather_scatter_backward";

    let (c_in, c_out) = validate_weight(weight.shape(), rulebook.geometry(), features.cols(), OP)?;
    let n_in = rulebook.input_sites().len();
    let n_out = rulebook.output_sites().len();
    if features.rows() != n_in {
        return Err(Error::shape_mismatch(&[n_in, c_in], &features.shape()));
    }
    if grad_output.shape() != [n_out, c_out] {
        return Err(Error::shape_mismatch(&[n_out, c_out], &grad_output.shape()));
    }
    rulebook.validate_sizes(n_in, n_out)?;

    let span = tracing::debug_span!(
        "gather_scatter_backward",
        mode = %rulebook.mode(),
        n_in,
        n_out,
        c_in,
        c_out,
        pairs = rulebook.total_pairs()
    );
    let _guard = span.enter();

    let x = features.as_slice();
    let dy = grad_output.as_slice();
    let w_len = c_in * c_out;

    let mut grad_w_acc = alloc_filled(rulebook.num_offsets() * w_len, T::acc_zero())?;
    let mut grad_in_acc = alloc_filled(n_in * c_in, T::acc_zero())?;

    if c_in > 0 && c_out > 0 {
        weight_grad(client, x, dy, rulebook, c_in, c_out, &mut grad_w_acc)?;

        let max_pairs = rulebook.max_pairs();
        let mut gathered: Vec<T> = alloc_zeroed(max_pairs * c_out)?;
        let mut products = alloc_filled(max_pairs * c_in, T::acc_zero())?;
        for (offset, pairs) in rulebook.all_pairs().iter().enumerate() {
            if pairs.is_empty() {
                continue;
            }
            let w_k = &weight.as_slice()[offset * w_len..(offset + 1) * w_len];
            for_each_row_chunk(
                client,
                pairs.output(),
                &mut gathered,
                c_out,
                &mut products,
                c_in,
                |rows, g, o| {
                    gather_rows_kernel(dy, c_out, rows, g);
                    o.fill(T::acc_zero());
                    matmul_bt_acc_kernel(g, w_k, o, rows.len(), c_out, c_in);
                },
            );
            scatter_add_rows_kernel(
                &products[..pairs.len() * c_in],
                c_in,
                pairs.input(),
                &mut grad_in_acc,
            );
        }
    }

    let mut bias_acc = alloc_filled(c_out, T::acc_zero())?;
    if c_out > 0 {
        for row in dy.chunks_exact(c_out) {
            for (b, &g) in bias_acc.iter_mut().zip(row) {
                *b = *b + g.to_acc();
            }
        }
    }

    let grad_input = FeatureMatrix::from_vec(narrow::<T>(&grad_in_acc)?, n_in, c_in)?;
    let grad_weight = DenseTensor::from_vec(narrow::<T>(&grad_w_acc)?, weight.shape())?;
    let grad_bias = DenseTensor::from_vec(narrow::<T>(&bias_acc)?, [c_out])?;

    tracing::debug!(n_in, "sparse convolution backward done");
    Ok((grad_input, grad_weight, grad_bias))
}

fn weight_grad<T: Element>(
    client: &CpuClient,
    x: &[T],
    dy: &[T],
    rulebook: &Rulebook,
    c_in: usize,
    c_out: usize,
    grad_w: &mut [T::Acc],
) -> Result<()> {
    let w_len = c_in * c_out;
    let slice_grad = |offset: usize, slot: &mut [T::Acc]| -> Result<()> {
        let pairs = rulebook.pairs(offset);
        if pairs.is_empty() {
            return Ok(());
        }
        let mut gx: Vec<T> = alloc_zeroed(pairs.len() * c_in)?;
        let mut gdy: Vec<T> = alloc_zeroed(pairs.len() * c_out)?;
        gather_rows_kernel(x, c_in, pairs.input(), &mut gx);
        gather_rows_kernel(dy, c_out, pairs.output(), &mut gdy);
        matmul_at_acc_kernel(&gx, &gdy, slot, pairs.len(), c_out, c_in);
        Ok(())
    };

    #[cfg(feature = "rayon")]
    {
        if !client.is_sequential() && rulebook.total_pairs() > client.rayon_min_len() {
            return client.install_parallelism(|| {
                grad_w
                    .par_chunks_mut(w_len)
                    .enumerate()
                    .try_for_each(|(offset, slot)| slice_grad(offset, slot))
            });
        }
    }

    #[cfg(not(feature = "rayon"))]
    let _ = client;

    for (offset, slot) in grad_w.chunks_exact_mut(w_len).enumerate() {
        slice_grad(offset, slot)?;
    }
    Ok(())
}

fn narrow<T: Element>(acc: &[T::Acc]) -> Result<Vec<T>> {
    let mut out = alloc_vec(acc.len())?;
    out.extend(acc.iter().map(|&v| T::from_acc(v)));
    Ok(out)
}
