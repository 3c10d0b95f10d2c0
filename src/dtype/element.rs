//! Element trait for mapping Rust float types to DType

use super::DType;
use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;
use std::ops::{Add, Mul, Sub};

/// Trait for types that can be feature or weight elements
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - kernels move elements across rayon workers
/// - `Pod + Zeroable` - zeroed buffers can be allocated without per-element init
/// - `Add + Sub + Mul` - arithmetic used by the gather-scatter kernels
/// - `PartialOrd` - comparison for max pooling
///
/// Accumulation happens in [`Element::Acc`], which is at least as wide as
/// the element itself (f32 for the half types).
pub trait Element:
    Copy
    + Clone
    + Debug
    + Send
    + Sync
    + Pod
    + Zeroable
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + PartialOrd
{
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Accumulator type used by matmul inner loops
    type Acc: Copy + Send + Sync + Add<Output = Self::Acc> + Mul<Output = Self::Acc>;

    /// Convert to f64 for generic numeric operations
    fn to_f64(self) -> f64;

    /// Convert from f64 to this type
    fn from_f64(v: f64) -> Self;

    /// Widen to the accumulator type
    fn to_acc(self) -> Self::Acc;

    /// Narrow from the accumulator type
    fn from_acc(v: Self::Acc) -> Self;

    /// Zero accumulator
    fn acc_zero() -> Self::Acc;

    /// Zero value
    fn zero() -> Self;

    /// One value
    fn one() -> Self;
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;
    type Acc = f64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_acc(self) -> f64 {
        self
    }

    #[inline]
    fn from_acc(v: f64) -> Self {
        v
    }

    #[inline]
    fn acc_zero() -> f64 {
        0.0
    }

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn one() -> Self {
        1.0
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
    type Acc = f32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_acc(self) -> f32 {
        self
    }

    #[inline]
    fn from_acc(v: f32) -> Self {
        v
    }

    #[inline]
    fn acc_zero() -> f32 {
        0.0
    }

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn one() -> Self {
        1.0
    }
}

// Half-precision floating point types (requires "f16" feature)

#[cfg(feature = "f16")]
impl Element for half::f16 {
    const DTYPE: DType = DType::F16;
    type Acc = f32;

    #[inline]
    fn to_f64(self) -> f64 {
        self.to_f64()
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }

    #[inline]
    fn to_acc(self) -> f32 {
        self.to_f32()
    }

    #[inline]
    fn from_acc(v: f32) -> Self {
        half::f16::from_f32(v)
    }

    #[inline]
    fn acc_zero() -> f32 {
        0.0
    }

    #[inline]
    fn zero() -> Self {
        half::f16::ZERO
    }

    #[inline]
    fn one() -> Self {
        half::f16::ONE
    }
}

#[cfg(feature = "f16")]
impl Element for half::bf16 {
    const DTYPE: DType = DType::BF16;
    type Acc = f32;

    #[inline]
    fn to_f64(self) -> f64 {
        self.to_f64()
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }

    #[inline]
    fn to_acc(self) -> f32 {
        self.to_f32()
    }

    #[inline]
    fn from_acc(v: f32) -> Self {
        half::bf16::from_f32(v)
    }

    #[inline]
    fn acc_zero() -> f32 {
        0.0
    }

    #[inline]
    fn zero() -> Self {
        half::bf16::ZERO
    }

    #[inline]
    fn one() -> Self {
        half::bf16::ONE
    }
}
