//! Host-side array types consumed and produced by the sparse engine
//!
//! - [`FeatureMatrix`]: row-major `N x C` per-site features
//! - [`DenseTensor`]: row-major n-dimensional array for weights, bias and
//!   dense conversion
//! - [`Shape`]: small-vector dimension list

mod dense;
mod matrix;
mod shape;

pub use dense::{ChannelOrder, DenseTensor};
pub use matrix::FeatureMatrix;
pub use shape::Shape;
