//! Sparse convolution engine for the CPU runtime
//!
//! The engine consumes a finished [`Rulebook`](crate::sparse::Rulebook) and
//! never builds or mutates one. For each kernel offset in canonical order it
//! gathers the paired input rows into a contiguous buffer, multiplies by the
//! offset's weight slice and scatter-adds into the output rows.
//!
//! # Accumulation order
//!
//! Gather and multiply run in parallel over row chunks of one offset. The
//! scatter-add is serial: offsets in canonical order, and within an offset
//! pairs in rulebook order. Accumulation happens in [`Element::Acc`]. The
//! result is therefore bit-identical for any thread count.

mod gather_scatter;
mod pool;

pub use gather_scatter::{gather_scatter_backward, gather_scatter_forward};
pub use pool::{max_pool_backward, max_pool_forward};

use super::CpuClient;
use crate::dtype::Element;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Run `f` over aligned row chunks of `rows`, `gathered` and `out`.
///
/// `gathered` holds `rows.len() x gather_cols` elements and `out` holds
/// `rows.len() x out_cols` accumulators. Both column counts must be non-zero.
pub(crate) fn for_each_row_chunk<T, F>(
    client: &CpuClient,
    rows: &[u32],
    gathered: &mut [T],
    gather_cols: usize,
    out: &mut [T::Acc],
    out_cols: usize,
    f: F,
) where
    T: Element,
    F: Fn(&[u32], &mut [T], &mut [T::Acc]) + Sync,
{
    let n = rows.len();
    let gathered = &mut gathered[..n * gather_cols];
    let out = &mut out[..n * out_cols];

    #[cfg(feature = "rayon")]
    {
        let min_len = client.rayon_min_len();
        if !client.is_sequential() && n > min_len {
            client.install_parallelism(|| {
                rows.par_chunks(min_len)
                    .zip(gathered.par_chunks_mut(min_len * gather_cols))
                    .zip(out.par_chunks_mut(min_len * out_cols))
                    .for_each(|((r, g), o)| f(r, g, o));
            });
            return;
        }
    }

    #[cfg(not(feature = "rayon"))]
    let _ = client;

    f(rows, gathered, out);
}
