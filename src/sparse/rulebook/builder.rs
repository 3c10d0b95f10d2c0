//! Rulebook construction
//!
//! All builds follow the same two phases:
//!
//! 1. candidate generation: for every input site and every kernel offset,
//!    compute the paired output coordinate. This only reads the input
//!    coordinates (and, in submanifold mode, a finished grid), so it runs in
//!    parallel over chunks of input sites.
//! 2. index assignment: candidates are replayed serially in (input site,
//!    offset) order, assigning output indices through a fresh [`HashGrid`].
//!
//! Phase 2 fixes the output order, so repeated builds over the same input
//! yield identical rulebooks regardless of thread count.

use super::{ConvMode, IndicePairs, Rulebook};
use crate::error::{Error, Result};
use crate::ops::ConvGeometry;
use crate::ops::conv_common::KernelIndex;
use crate::runtime::allocator::alloc_vec;
use crate::runtime::cpu::CpuClient;
use crate::sparse::{CoordinateSet, HashGrid};
use crate::tensor::Shape;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use smallvec::SmallVec;
use std::sync::Arc;

/// One (input site, offset) -> target candidate
///
/// `target` is a linearized output key in regular and transposed modes and an
/// output site index in submanifold mode.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    site: u32,
    offset: u32,
    target: u64,
}

/// Precomputed per-dimension arithmetic for one build
struct OffsetTable {
    /// `k * dilation` per offset and dimension, row-major
    scaled: Vec<i64>,
    padding: SmallVec<[i64; 4]>,
    stride: SmallVec<[i64; 4]>,
    out_shape: SmallVec<[i64; 4]>,
    ndim: usize,
}

impl OffsetTable {
    fn new(geometry: &ConvGeometry, out_shape: &Shape) -> Self {
        let ndim = geometry.ndim();
        let indices: Vec<KernelIndex> = geometry.kernel_indices();
        let mut scaled = Vec::with_capacity(indices.len() * ndim);
        for k in &indices {
            for d in 0..ndim {
                scaled.push((k[d] * geometry.dilation[d]) as i64);
            }
        }
        Self {
            scaled,
            padding: geometry.padding.iter().map(|&p| p as i64).collect(),
            stride: geometry.stride.iter().map(|&s| s as i64).collect(),
            out_shape: out_shape.iter().map(|&s| s as i64).collect(),
            ndim,
        }
    }

    #[inline]
    fn num_offsets(&self) -> usize {
        self.scaled.len() / self.ndim.max(1)
    }

    /// Output coordinate of `coord` under `offset` for a forward convolution
    ///
    /// `output = (input + padding - k * dilation) / stride`, exact division only.
    #[inline]
    fn forward_target(&self, coord: &[i32], offset: usize, out: &mut [i32]) -> bool {
        out[0] = coord[0];
        let scaled = &self.scaled[offset * self.ndim..(offset + 1) * self.ndim];
        for d in 0..self.ndim {
            let n = coord[d + 1] as i64 + self.padding[d] - scaled[d];
            if n < 0 || n % self.stride[d] != 0 {
                return false;
            }
            let o = n / self.stride[d];
            if o >= self.out_shape[d] {
                return false;
            }
            out[d + 1] = o as i32;
        }
        true
    }

    /// Output coordinate of `coord` under `offset` for a transposed convolution
    ///
    /// `output = input * stride - padding + k * dilation`.
    #[inline]
    fn transposed_target(&self, coord: &[i32], offset: usize, out: &mut [i32]) -> bool {
        out[0] = coord[0];
        let scaled = &self.scaled[offset * self.ndim..(offset + 1) * self.ndim];
        for d in 0..self.ndim {
            let o = coord[d + 1] as i64 * self.stride[d] - self.padding[d] + scaled[d];
            if o < 0 || o >= self.out_shape[d] {
                return false;
            }
            out[d + 1] = o as i32;
        }
        true
    }
}

/// Build the rulebook of `input` for a convolution with `geometry` in `mode`.
///
/// - `Regular` / `Transposed`: computes a new output active-site set; output
///   indices follow first discovery in (input site, offset) order.
/// - `Submanifold`: output sites are the input sites (same `Arc`); only
///   offsets landing on an existing site produce pairs.
/// - `Inverse`: rejected; use [`invert_rulebook`] on the cached forward
///   rulebook instead.
///
/// The batch index of an output site always equals that of its input site.
pub fn build_rulebook(
    client: &CpuClient,
    input: &Arc<CoordinateSet>,
    geometry: &ConvGeometry,
    mode: ConvMode,
) -> Result<Rulebook> {
    const OP: &str = "build_rulebook";

    let out_shape = geometry.output_spatial_shape(input.spatial_shape(), mode, OP)?;
    let span = tracing::debug_span!("build_rulebook", mode = %mode, input_sites = input.len());
    let _guard = span.enter();

    let table = OffsetTable::new(geometry, &out_shape);
    let rulebook = match mode {
        ConvMode::Submanifold => build_submanifold(client, input, geometry, &table)?,
        ConvMode::Regular | ConvMode::Transposed => {
            build_generative(client, input, geometry, mode, &table, out_shape)?
        }
        ConvMode::Inverse => {
            return Err(Error::invalid_argument(
                "mode",
                "inverse rulebooks are derived from a cached forward rulebook",
            ));
        }
    };

    tracing::debug!(
        output_sites = rulebook.output_sites().len(),
        total_pairs = rulebook.total_pairs(),
        "rulebook built"
    );
    Ok(rulebook)
}

/// Inverse of a forward rulebook.
///
/// The result maps the forward output sites back onto the forward input
/// sites with every pair swapped, so an inverse convolution restores the
/// coordinate set the forward convolution started from.
pub fn invert_rulebook(forward: &Rulebook) -> Result<Rulebook> {
    match forward.mode() {
        ConvMode::Regular | ConvMode::Submanifold => {}
        other => {
            return Err(Error::invalid_argument(
                "rulebook",
                format!("cannot invert a {} rulebook", other),
            ));
        }
    }
    let inverse = forward.transposed();
    inverse.validate()?;
    tracing::debug!(
        output_sites = inverse.output_sites().len(),
        total_pairs = inverse.total_pairs(),
        "rulebook inverted"
    );
    Ok(inverse)
}

fn build_generative(
    client: &CpuClient,
    input: &Arc<CoordinateSet>,
    geometry: &ConvGeometry,
    mode: ConvMode,
    table: &OffsetTable,
    out_shape: Shape,
) -> Result<Rulebook> {
    let num_offsets = table.num_offsets();
    let row_len = input.row_len();
    let mut grid = HashGrid::with_capacity(
        &out_shape,
        input.batch_size(),
        client.grid_policy(),
        input.len(),
    )?;

    let candidates = {
        let grid = &grid;
        collect_candidates(client, input.len(), |site, acc| {
            let coord = input.coord(site);
            let mut target: SmallVec<[i32; 5]> = SmallVec::from_elem(0, row_len);
            for offset in 0..num_offsets {
                let valid = match mode {
                    ConvMode::Transposed => table.transposed_target(coord, offset, &mut target),
                    _ => table.forward_target(coord, offset, &mut target),
                };
                if valid {
                    if let Some(key) = grid.key_of(&target) {
                        acc.push(Candidate {
                            site: site as u32,
                            offset: offset as u32,
                            target: key,
                        });
                    }
                }
            }
        })?
    };

    let mut pairs = vec![IndicePairs::default(); num_offsets];
    let mut keys: Vec<u64> = alloc_vec(input.len())?;
    for c in &candidates {
        let out = grid.insert_key_or_get(c.target)?;
        if out == keys.len() {
            keys.push(c.target);
        }
        pairs[c.offset as usize].push(c.site, out as u32);
    }

    let mut indices: Vec<i32> = alloc_vec(keys.len() * row_len)?;
    let mut coord: SmallVec<[i32; 5]> = SmallVec::from_elem(0, row_len);
    for &key in &keys {
        grid.coord_of(key, &mut coord);
        indices.extend_from_slice(&coord);
    }
    let output = CoordinateSet::new_unchecked(indices, out_shape, input.batch_size())?;

    Rulebook::from_parts(
        Arc::clone(input),
        Arc::new(output),
        geometry.clone(),
        mode,
        pairs,
    )
}

fn build_submanifold(
    client: &CpuClient,
    input: &Arc<CoordinateSet>,
    geometry: &ConvGeometry,
    table: &OffsetTable,
) -> Result<Rulebook> {
    let num_offsets = table.num_offsets();
    let row_len = input.row_len();
    let mut grid = HashGrid::with_capacity(
        input.spatial_shape(),
        input.batch_size(),
        client.grid_policy(),
        input.len(),
    )?;
    for (row, coord) in input.iter().enumerate() {
        let index = grid.insert_or_get(coord)?;
        if index != row {
            return Err(Error::DuplicateCoordinate {
                coord: coord.to_vec(),
                first: index,
                second: row,
            });
        }
    }

    let candidates = {
        let grid = &grid;
        collect_candidates(client, input.len(), |site, acc| {
            let coord = input.coord(site);
            let mut target: SmallVec<[i32; 5]> = SmallVec::from_elem(0, row_len);
            for offset in 0..num_offsets {
                if table.forward_target(coord, offset, &mut target) {
                    if let Some(out) = grid.get(&target) {
                        acc.push(Candidate {
                            site: site as u32,
                            offset: offset as u32,
                            target: out as u64,
                        });
                    }
                }
            }
        })?
    };

    let mut pairs = vec![IndicePairs::default(); num_offsets];
    for c in &candidates {
        pairs[c.offset as usize].push(c.site, c.target as u32);
    }

    Rulebook::from_parts(
        Arc::clone(input),
        Arc::clone(input),
        geometry.clone(),
        ConvMode::Submanifold,
        pairs,
    )
}

/// Run `per_site` over `0..num_sites`, concatenating results in site order.
fn collect_candidates<F>(client: &CpuClient, num_sites: usize, per_site: F) -> Result<Vec<Candidate>>
where
    F: Fn(usize, &mut Vec<Candidate>) + Sync,
{
    if num_sites > u32::MAX as usize {
        return Err(Error::invalid_argument(
            "indices",
            format!("{} active sites exceed the u32 index range", num_sites),
        ));
    }

    #[cfg(feature = "rayon")]
    {
        let min_len = client.rayon_min_len();
        if !client.is_sequential() && num_sites > min_len {
            let num_chunks = num_sites.div_ceil(min_len);
            let chunks: Vec<Vec<Candidate>> = client.install_parallelism(|| {
                (0..num_chunks)
                    .into_par_iter()
                    .map(|chunk| {
                        let start = chunk * min_len;
                        let end = (start + min_len).min(num_sites);
                        let mut acc = Vec::new();
                        for site in start..end {
                            per_site(site, &mut acc);
                        }
                        acc
                    })
                    .collect()
            });
            let total = chunks.iter().map(Vec::len).sum();
            let mut out = alloc_vec(total)?;
            for chunk in chunks {
                out.extend(chunk);
            }
            return Ok(out);
        }
    }

    #[cfg(not(feature = "rayon"))]
    let _ = client;

    let mut out = Vec::new();
    for site in 0..num_sites {
        per_site(site, &mut out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ParallelismConfig;
    use crate::sparse::GridPolicy;

    fn sites_2d(coords: &[[i32; 3]], shape: [usize; 2], batch: usize) -> Arc<CoordinateSet> {
        let indices: Vec<i32> = coords.iter().flatten().copied().collect();
        Arc::new(CoordinateSet::new(indices, shape, batch).unwrap())
    }

    fn pair_list(rulebook: &Rulebook, offset: usize) -> Vec<(usize, usize)> {
        rulebook.pairs(offset).iter().collect()
    }

    #[test]
    fn test_submanifold_two_sites() {
        let client = CpuClient::new();
        let input = sites_2d(&[[0, 0, 0], [0, 1, 1]], [4, 4], 1);
        let geometry = ConvGeometry::submanifold(2, 3);
        let rb = build_rulebook(&client, &input, &geometry, ConvMode::Submanifold).unwrap();

        assert!(Arc::ptr_eq(rb.output_sites(), &input));
        assert_eq!(rb.num_offsets(), 9);
        // center offset pairs every site with itself
        assert_eq!(pair_list(&rb, 4), vec![(0, 0), (1, 1)]);
        // kernel index (2, 2): input = output + (1, 1)
        assert_eq!(pair_list(&rb, 8), vec![(1, 0)]);
        // kernel index (0, 0): input = output - (1, 1)
        assert_eq!(pair_list(&rb, 0), vec![(0, 1)]);
        assert_eq!(rb.total_pairs(), 4);
    }

    #[test]
    fn test_regular_downsample_1d() {
        let client = CpuClient::new();
        let indices: Vec<i32> = [0, 1, 5, 6, 7].iter().flat_map(|&x| [0, x]).collect();
        let input = Arc::new(CoordinateSet::new(indices, [8], 1).unwrap());
        let geometry = ConvGeometry::uniform(1, 2, 2, 0, 1);
        let rb = build_rulebook(&client, &input, &geometry, ConvMode::Regular).unwrap();

        // outputs discovered in input order: x=0 -> 0, x=5 -> 2, x=6 -> 3
        assert_eq!(rb.output_sites().as_slice(), &[0, 0, 0, 2, 0, 3]);
        assert_eq!(rb.output_sites().spatial_shape().as_slice(), &[4]);
        assert_eq!(pair_list(&rb, 0), vec![(0, 0), (3, 2)]);
        assert_eq!(pair_list(&rb, 1), vec![(1, 0), (2, 1), (4, 2)]);
    }

    #[test]
    fn test_regular_keeps_batches_apart() {
        let client = CpuClient::new();
        let input = sites_2d(&[[0, 1, 1], [1, 1, 1]], [4, 4], 2);
        let geometry = ConvGeometry::uniform(2, 3, 2, 1, 1);
        let rb = build_rulebook(&client, &input, &geometry, ConvMode::Regular).unwrap();
        for pairs in rb.all_pairs() {
            for (i, o) in pairs.iter() {
                assert_eq!(input.coord(i)[0], rb.output_sites().coord(o)[0]);
            }
        }
        assert!(rb.output_sites().len() >= 2);
    }

    #[test]
    fn test_transposed_upsample_1d() {
        let client = CpuClient::new();
        let indices: Vec<i32> = vec![0, 0, 0, 2];
        let input = Arc::new(CoordinateSet::new(indices, [4], 1).unwrap());
        let geometry = ConvGeometry::uniform(1, 2, 2, 0, 1);
        let rb = build_rulebook(&client, &input, &geometry, ConvMode::Transposed).unwrap();
        assert_eq!(rb.output_sites().spatial_shape().as_slice(), &[8]);
        assert_eq!(rb.output_sites().as_slice(), &[0, 0, 0, 1, 0, 4, 0, 5]);
        assert_eq!(pair_list(&rb, 0), vec![(0, 0), (1, 2)]);
        assert_eq!(pair_list(&rb, 1), vec![(0, 1), (1, 3)]);
    }

    #[test]
    fn test_build_is_deterministic_across_policies_and_threads() {
        let coords: Vec<[i32; 3]> = (0..200)
            .map(|i| [i % 2, (i * 7) % 16, (i * 13) % 16])
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let input = sites_2d(&coords, [16, 16], 2);
        let geometry = ConvGeometry::uniform(2, 3, 2, 1, 1);

        let serial = CpuClient::new()
            .with_parallelism(ParallelismConfig::sequential())
            .with_grid_policy(GridPolicy::Dense);
        let parallel = CpuClient::new()
            .with_parallelism(ParallelismConfig::new(Some(4), Some(8)))
            .with_grid_policy(GridPolicy::Hash);

        let a = build_rulebook(&serial, &input, &geometry, ConvMode::Regular).unwrap();
        let b = build_rulebook(&parallel, &input, &geometry, ConvMode::Regular).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invert_rulebook() {
        let client = CpuClient::new();
        let input = sites_2d(&[[0, 0, 0], [0, 3, 2], [0, 2, 2]], [4, 4], 1);
        let geometry = ConvGeometry::uniform(2, 2, 2, 0, 1);
        let forward = build_rulebook(&client, &input, &geometry, ConvMode::Regular).unwrap();
        let inverse = invert_rulebook(&forward).unwrap();
        assert!(inverse.output_sites().same_sites(&input));
        assert_eq!(inverse.total_pairs(), forward.total_pairs());
        assert!(invert_rulebook(&inverse).is_err());
    }

    #[test]
    fn test_build_rejects_inverse_mode() {
        let client = CpuClient::new();
        let input = sites_2d(&[[0, 0, 0]], [4, 4], 1);
        let geometry = ConvGeometry::uniform(2, 2, 2, 0, 1);
        assert!(build_rulebook(&client, &input, &geometry, ConvMode::Inverse).is_err());
    }

    #[test]
    fn test_empty_input() {
        let client = CpuClient::new();
        let input = Arc::new(CoordinateSet::empty([4, 4], 1).unwrap());
        let geometry = ConvGeometry::uniform(2, 3, 1, 1, 1);
        let rb = build_rulebook(&client, &input, &geometry, ConvMode::Regular).unwrap();
        assert!(rb.output_sites().is_empty());
        assert_eq!(rb.num_offsets(), 9);
        assert_eq!(rb.total_pairs(), 0);
    }
}
