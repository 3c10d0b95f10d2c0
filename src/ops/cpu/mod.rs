//! CPU implementation of sparse operations.
//!
//! Operation traits are implemented for [`CpuClient`](crate::runtime::cpu::CpuClient)
//! here; the compute itself lives in `runtime::cpu::sparse`.

mod sparse_conv;
