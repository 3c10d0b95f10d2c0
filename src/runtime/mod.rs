//! Runtime support: allocation, parallelism configuration and the CPU backend
//!
//! The CPU backend is the only one shipped. Its client ([`cpu::CpuClient`])
//! carries the configuration every sparse operation needs and implements the
//! operation traits from [`crate::ops`].

pub mod allocator;
pub mod cpu;
mod parallelism;

pub use parallelism::{DEFAULT_MIN_LEN, ParallelismConfig};
