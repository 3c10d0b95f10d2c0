//! CPU backend for sparse convolution
//!
//! - [`CpuClient`] holds parallelism and hash-grid configuration
//! - `kernels` contains the dense building blocks (matmul, row gather/scatter)
//! - `sparse` contains the rulebook-driven gather-scatter engine

mod client;
pub mod kernels;
pub mod sparse;

pub use client::CpuClient;
