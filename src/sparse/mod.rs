//! Sparse convolution tensors and the rulebook machinery behind them
//!
//! A sparse convolution tensor stores only its *active sites*: one integer
//! coordinate `[batch, x0, .., x_{D-1}]` and one feature row per site. All
//! convolution variants reduce to the same two steps:
//!
//! 1. Build a [`Rulebook`]: for every kernel offset, the list of
//!    `(input row, output row)` pairs it connects. Coordinates are looked up
//!    through a [`HashGrid`].
//! 2. Run gather, matmul and scatter-add per kernel offset over those pairs.
//!
//! # Convolution modes
//!
//! - **Regular**: output sites are every cell reached by some input site
//!   through some kernel offset (strided downsampling).
//! - **Submanifold**: output sites are the input sites; the active set never
//!   dilates.
//! - **Inverse**: undoes a cached regular convolution by swapping its pairs.
//! - **Transposed**: generates new sites on a finer grid (upsampling).
//!
//! # Usage
//!
//! ```
//! # use spconv::prelude::*;
//! let client = CpuClient::new();
//! let features = FeatureMatrix::from_slice(&[1.0f32, 2.0], 2, 1)?;
//! let x = SparseConvTensor::new(features, vec![0, 0, 0, 0, 1, 1], [3, 3], 1)?;
//!
//! // 3x3 submanifold convolution, one input and one output channel
//! let weight = DenseTensor::from_vec(vec![1.0f32; 9], [3, 3, 1, 1])?;
//! let geometry = ConvGeometry::submanifold(2, 3);
//! let y = client.submanifold_conv(&x, &weight, None, &geometry, "subm1")?;
//!
//! assert_eq!(y.indices(), x.indices());
//! assert_eq!(y.features().as_slice(), &[3.0, 3.0]);
//! # Ok::<(), spconv::error::Error>(())
//! ```
//!
//! Rulebooks are cached per tensor lineage under `(tag, geometry, mode)`:
//! every layer that reuses a tag at the same resolution reuses the rulebook.

mod coords;
pub(crate) mod hash_grid;
pub mod layers;
mod rulebook;
mod tensor;

pub use coords::CoordinateSet;
pub use hash_grid::{DEFAULT_DENSE_LIMIT, GridPolicy, HashGrid};
pub use layers::{SparseConv, SparseMaxPool, ToDense, ToSparse};
pub use rulebook::{
    ConvMode, IndicePairs, Rulebook, RulebookCache, RulebookKey, build_rulebook, invert_rulebook,
};
pub use tensor::SparseConvTensor;
