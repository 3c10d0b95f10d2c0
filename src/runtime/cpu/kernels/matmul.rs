//! Accumulating matrix multiplication kernels
//!
//! All kernels add into an output buffer held in the element's accumulator
//! type; callers zero the buffer when they need a plain product. Matrices are
//! dense row-major slices with leading dimension equal to their column count.

use crate::dtype::Element;

/// `out[m x n] += a[m x k] @ b[k x n]`
///
/// ikj loop order keeps the `b` row and the `out` row hot in cache.
#[inline]
pub fn matmul_acc_kernel<T: Element>(
    a: &[T],
    b: &[T],
    out: &mut [T::Acc],
    m: usize,
    n: usize,
    k: usize,
) {
    debug_assert!(a.len() >= m * k && b.len() >= k * n && out.len() >= m * n);
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        let out_row = &mut out[i * n..(i + 1) * n];
        for (kk, &a_val) in a_row.iter().enumerate() {
            let a_val = a_val.to_acc();
            let b_row = &b[kk * n..(kk + 1) * n];
            for (o, &b_val) in out_row.iter_mut().zip(b_row) {
                *o = *o + a_val * b_val.to_acc();
            }
        }
    }
}

/// `out[m x k] += a[m x n] @ b[k x n]^T`
///
/// Used to push output gradients back through a weight slice.
#[inline]
pub fn matmul_bt_acc_kernel<T: Element>(
    a: &[T],
    b: &[T],
    out: &mut [T::Acc],
    m: usize,
    n: usize,
    k: usize,
) {
    debug_assert!(a.len() >= m * n && b.len() >= k * n && out.len() >= m * k);
    for i in 0..m {
        let a_row = &a[i * n..(i + 1) * n];
        let out_row = &mut out[i * k..(i + 1) * k];
        for (kk, o) in out_row.iter_mut().enumerate() {
            let b_row = &b[kk * n..(kk + 1) * n];
            let mut acc = *o;
            for (&x, &y) in a_row.iter().zip(b_row) {
                acc = acc + x.to_acc() * y.to_acc();
            }
            *o = acc;
        }
    }
}

/// `out[k x n] += a[m x k]^T @ b[m x n]`
///
/// Used for weight gradients: rows of `a` and `b` are paired sites.
#[inline]
pub fn matmul_at_acc_kernel<T: Element>(
    a: &[T],
    b: &[T],
    out: &mut [T::Acc],
    m: usize,
    n: usize,
    k: usize,
) {
    debug_assert!(a.len() >= m * k && b.len() >= m * n && out.len() >= k * n);
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        let b_row = &b[i * n..(i + 1) * n];
        for (kk, &a_val) in a_row.iter().enumerate() {
            let a_val = a_val.to_acc();
            let out_row = &mut out[kk * n..(kk + 1) * n];
            for (o, &b_val) in out_row.iter_mut().zip(b_row) {
                *o = *o + a_val * b_val.to_acc();
            }
        }
    }
}
