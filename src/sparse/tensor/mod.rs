//! Sparse convolution tensor

mod conversion;
mod core;

pub use core::SparseConvTensor;
