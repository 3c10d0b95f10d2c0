//! Row gather and scatter-add kernels
//!
//! Row indices are assumed to be in range; the sparse engine validates the
//! rulebook against the feature matrices before calling in here.

use std::ops::Add;

/// Copy rows `rows[j]` of `src` into row `j` of `dst`.
#[inline]
pub fn gather_rows_kernel<T: Copy>(src: &[T], cols: usize, rows: &[u32], dst: &mut [T]) {
    debug_assert!(dst.len() >= rows.len() * cols);
    for (dst_row, &r) in dst.chunks_exact_mut(cols.max(1)).zip(rows) {
        let r = r as usize;
        dst_row[..cols].copy_from_slice(&src[r * cols..(r + 1) * cols]);
    }
}

/// Add row `j` of `src` into row `rows[j]` of `dst`, in order of `j`.
///
/// Repeated target rows accumulate; the fixed order makes the result
/// bit-reproducible.
#[inline]
pub fn scatter_add_rows_kernel<A>(src: &[A], cols: usize, rows: &[u32], dst: &mut [A])
where
    A: Copy + Add<Output = A>,
{
    debug_assert!(src.len() >= rows.len() * cols);
    for (src_row, &r) in src.chunks_exact(cols.max(1)).zip(rows) {
        let r = r as usize;
        let dst_row = &mut dst[r * cols..(r + 1) * cols];
        for (d, &s) in dst_row.iter_mut().zip(&src_row[..cols]) {
            *d = *d + s;
        }
    }
}
