//! CPU kernel implementations
//!
//! Low-level compute kernels used by the sparse gather-scatter engine.
//! Kernels are generic over `T: Element` and work on plain row-major slices.

pub mod gather_scatter;
pub mod matmul;

pub use gather_scatter::{gather_rows_kernel, scatter_add_rows_kernel};
pub use matmul::{matmul_acc_kernel, matmul_at_acc_kernel, matmul_bt_acc_kernel};
