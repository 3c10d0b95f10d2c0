//! # spconv
//!
//! **Sparse convolution engine for N-dimensional point and voxel data.**
//!
//! spconv computes convolutions over tensors that store only their active
//! sites. Each convolution is split into an index phase and a compute phase:
//!
//! - **Rulebook construction**: for every kernel offset, the pairs of input
//!   and output rows it connects. Built once per `(tag, geometry, mode)` and
//!   cached with the tensor.
//! - **Gather-scatter**: per kernel offset, gather input rows, multiply by
//!   the weight slice and scatter-add into the output rows.
//!
//! ## Convolution modes
//!
//! | Mode | Output sites | Typical use |
//! |------|--------------|-------------|
//! | Regular | every cell any input reaches | strided downsampling |
//! | Submanifold | the input sites | feature extraction at one resolution |
//! | Inverse | the sites a regular conv started from | decoder upsampling |
//! | Transposed | `input * stride - padding + k * dilation` | generative upsampling |
//!
//! ## Quick Start
//!
//! ```
//! use spconv::prelude::*;
//!
//! let client = CpuClient::new();
//!
//! // Two active sites of a 4x4 grid, one channel each
//! let features = FeatureMatrix::from_slice(&[1.0f32, 2.0], 2, 1)?;
//! let x = SparseConvTensor::new(features, vec![0, 0, 0, 0, 2, 2], [4, 4], 1)?;
//!
//! // 2x2 stride-2 downsampling, then back up through the same rulebook
//! let down = SparseConv::regular(
//!     DenseTensor::from_vec(vec![1.0f32; 4], [2, 2, 1, 1])?,
//!     None,
//!     ConvGeometry::uniform(2, 2, 2, 0, 1),
//!     "down1",
//! )?;
//! let up = SparseConv::inverse(
//!     DenseTensor::from_vec(vec![1.0f32; 4], [2, 2, 1, 1])?,
//!     None,
//!     ConvGeometry::uniform(2, 2, 2, 0, 1),
//!     "down1",
//! )?;
//!
//! let y = down.forward(&client, &x)?;
//! assert_eq!(y.spatial_shape().as_slice(), &[2, 2]);
//! let z = up.forward(&client, &y)?;
//! assert_eq!(z.indices(), x.indices());
//! # Ok::<(), spconv::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): Multi-threaded rulebook builds and kernels
//! - `f16`: Half-precision elements (F16, BF16) accumulating in `f32`
//!
//! ## Determinism
//!
//! Output site order, pair lists and accumulation order do not depend on the
//! number of threads. Repeated runs produce bit-identical results.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dtype;
pub mod error;
pub mod ops;
pub mod runtime;
pub mod sparse;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::Element;
    pub use crate::error::{Error, Result};
    pub use crate::ops::{ConvGeometry, SparseConvOps};
    pub use crate::runtime::ParallelismConfig;
    pub use crate::runtime::cpu::CpuClient;
    pub use crate::sparse::{
        ConvMode, GridPolicy, Rulebook, RulebookKey, SparseConv, SparseConvTensor, SparseMaxPool,
        ToDense, ToSparse,
    };
    pub use crate::tensor::{ChannelOrder, DenseTensor, FeatureMatrix, Shape};
}
