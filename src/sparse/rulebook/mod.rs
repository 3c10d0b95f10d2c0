//! Rulebooks: per-kernel-offset input/output site pairs
//!
//! A rulebook turns a sparse convolution into, for every kernel offset, a
//! gather of input rows, one matrix multiply, and a scatter-add into output
//! rows. Offsets follow the canonical row-major kernel order
//! ([`ConvGeometry::kernel_indices`]), which is also the order of the weight
//! slices.

mod builder;
mod cache;
mod key;

pub use builder::{build_rulebook, invert_rulebook};
pub use cache::RulebookCache;
pub use key::{ConvMode, RulebookKey};

use crate::error::{Error, Result};
use crate::ops::ConvGeometry;
use crate::sparse::CoordinateSet;
use std::sync::Arc;

/// Site pairs of a single kernel offset, stored column-wise
///
/// Pair `j` connects input site `input[j]` to output site `output[j]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicePairs {
    pub(crate) input: Vec<u32>,
    pub(crate) output: Vec<u32>,
}

impl IndicePairs {
    /// Build from parallel input/output index columns
    pub fn new(input: Vec<u32>, output: Vec<u32>) -> Result<Self> {
        if input.len() != output.len() {
            return Err(Error::shape_mismatch(&[input.len()], &[output.len()]));
        }
        Ok(Self { input, output })
    }

    /// Number of pairs
    #[inline]
    pub fn len(&self) -> usize {
        self.input.len()
    }

    /// Returns true if the offset has no pairs
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Input site indices
    #[inline]
    pub fn input(&self) -> &[u32] {
        &self.input
    }

    /// Output site indices
    #[inline]
    pub fn output(&self) -> &[u32] {
        &self.output
    }

    /// Iterate over `(input, output)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.input
            .iter()
            .zip(self.output.iter())
            .map(|(&i, &o)| (i as usize, o as usize))
    }

    #[inline]
    fn push(&mut self, input: u32, output: u32) {
        self.input.push(input);
        self.output.push(output);
    }

    fn swapped(&self) -> Self {
        Self {
            input: self.output.clone(),
            output: self.input.clone(),
        }
    }
}

/// Index mapping between an input and an output active-site set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rulebook {
    input: Arc<CoordinateSet>,
    output: Arc<CoordinateSet>,
    geometry: ConvGeometry,
    mode: ConvMode,
    pairs: Vec<IndicePairs>,
}

impl Rulebook {
    /// Assemble a rulebook from parts and check its integrity
    pub fn from_parts(
        input: Arc<CoordinateSet>,
        output: Arc<CoordinateSet>,
        geometry: ConvGeometry,
        mode: ConvMode,
        pairs: Vec<IndicePairs>,
    ) -> Result<Self> {
        let rulebook = Self {
            input,
            output,
            geometry,
            mode,
            pairs,
        };
        rulebook.validate()?;
        Ok(rulebook)
    }

    /// Input active-site set
    #[inline]
    pub fn input_sites(&self) -> &Arc<CoordinateSet> {
        &self.input
    }

    /// Output active-site set
    #[inline]
    pub fn output_sites(&self) -> &Arc<CoordinateSet> {
        &self.output
    }

    /// Geometry the rulebook was built for
    #[inline]
    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    /// Mode the rulebook was built for
    #[inline]
    pub fn mode(&self) -> ConvMode {
        self.mode
    }

    /// Number of kernel offsets
    #[inline]
    pub fn num_offsets(&self) -> usize {
        self.pairs.len()
    }

    /// Pairs of kernel offset `offset`
    ///
    /// # Panics
    ///
    /// Panics if `offset >= num_offsets()`.
    #[inline]
    pub fn pairs(&self, offset: usize) -> &IndicePairs {
        &self.pairs[offset]
    }

    /// Pair lists of all offsets in canonical order
    #[inline]
    pub fn all_pairs(&self) -> &[IndicePairs] {
        &self.pairs
    }

    /// Number of pairs of kernel offset `offset`, 0 if out of range
    #[inline]
    pub fn pair_count(&self, offset: usize) -> usize {
        self.pairs.get(offset).map_or(0, IndicePairs::len)
    }

    /// Number of pairs for each offset
    pub fn pair_counts(&self) -> Vec<usize> {
        self.pairs.iter().map(IndicePairs::len).collect()
    }

    /// Total number of pairs across offsets
    pub fn total_pairs(&self) -> usize {
        self.pairs.iter().map(IndicePairs::len).sum()
    }

    /// Largest pair count of a single offset
    pub fn max_pairs(&self) -> usize {
        self.pairs.iter().map(IndicePairs::len).max().unwrap_or(0)
    }

    /// Rulebook with input and output roles swapped, in inverse mode
    pub fn transposed(&self) -> Rulebook {
        Rulebook {
            input: Arc::clone(&self.output),
            output: Arc::clone(&self.input),
            geometry: self.geometry.clone(),
            mode: ConvMode::Inverse,
            pairs: self.pairs.iter().map(IndicePairs::swapped).collect(),
        }
    }

    /// Check offset count and that every pair indexes existing sites
    pub fn validate(&self) -> Result<()> {
        self.validate_sizes(self.input.len(), self.output.len())
    }

    /// Check the rulebook against explicit input/output row counts
    pub fn validate_sizes(&self, num_input: usize, num_output: usize) -> Result<()> {
        if self.pairs.len() != self.geometry.kernel_volume() {
            return Err(Error::integrity(format!(
                "rulebook has {} offsets, kernel volume is {}",
                self.pairs.len(),
                self.geometry.kernel_volume()
            )));
        }
        for (offset, pairs) in self.pairs.iter().enumerate() {
            if pairs.input.len() != pairs.output.len() {
                return Err(Error::integrity(format!(
                    "offset {} has {} input and {} output indices",
                    offset,
                    pairs.input.len(),
                    pairs.output.len()
                )));
            }
            if let Some(&bad) = pairs.input.iter().find(|&&i| i as usize >= num_input) {
                return Err(Error::integrity(format!(
                    "offset {} references input site {} of {}",
                    offset, bad, num_input
                )));
            }
            if let Some(&bad) = pairs.output.iter().find(|&&o| o as usize >= num_output) {
                return Err(Error::integrity(format!(
                    "offset {} references output site {} of {}",
                    offset, bad, num_output
                )));
            }
        }
        Ok(())
    }
}
