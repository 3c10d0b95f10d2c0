//! Fallible host allocation for feature and coordinate buffers
//!
//! Every buffer whose size depends on user input goes through these helpers
//! so that an impossible allocation surfaces as [`Error::OutOfMemory`]
//! instead of aborting the process.

use crate::error::{Error, Result};
use bytemuck::Zeroable;

/// Computes `len * size_of::<T>()`, failing on overflow.
#[inline]
pub fn byte_size<T>(len: usize) -> Result<usize> {
    len.checked_mul(std::mem::size_of::<T>())
        .ok_or(Error::OutOfMemory { size: usize::MAX })
}

/// Allocates an empty vector with room for exactly `capacity` elements.
pub fn alloc_vec<T>(capacity: usize) -> Result<Vec<T>> {
    let size = byte_size::<T>(capacity)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(capacity)
        .map_err(|_| Error::OutOfMemory { size })?;
    Ok(buf)
}

/// Allocates a zero-filled vector of `len` elements.
pub fn alloc_zeroed<T: Zeroable + Clone>(len: usize) -> Result<Vec<T>> {
    let mut buf = alloc_vec(len)?;
    buf.resize(len, T::zeroed());
    Ok(buf)
}

/// Allocates a vector of `len` copies of `value`.
pub fn alloc_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut buf = alloc_vec(len)?;
    buf.resize(len, value);
    Ok(buf)
}
