//! Operation traits

mod sparse_conv;

pub use sparse_conv::SparseConvOps;
