//! Sparse convolution operations
//!
//! Operations are defined as traits implemented by a runtime client.
//! The client carries the execution configuration (thread pool,
//! hash-grid policy); tensors carry data and the rulebook cache.
//!
//! ```text
//! CpuClient
//!   └── implements SparseConvOps<T>
//!         ├── sparse_conv, submanifold_conv   (forward, build or reuse rulebook)
//!         ├── inverse_conv, transposed_conv   (upsampling)
//!         ├── sparse_max_pool
//!         └── *_backward                      (gradients from a rulebook)
//! ```
//!
//! Geometry validation and output-shape arithmetic shared by all modes live
//! in [`conv_common`].

pub mod conv_common;
mod cpu;
mod traits;

pub use conv_common::ConvGeometry;
pub use traits::SparseConvOps;
