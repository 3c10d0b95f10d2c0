//! Shape type: dimensions of a dense array or a spatial grid

use smallvec::SmallVec;
use std::fmt;
use std::iter::FromIterator;
use std::ops::Deref;

/// Stack allocation threshold for dimensions
///
/// Sparse convolution rarely goes beyond 3 spatial dims plus batch and channel,
/// so up to 5 dimensions stay on the stack.
pub(crate) const STACK_DIMS: usize = 5;

/// Shape type: dimensions of a tensor or spatial grid
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(SmallVec<[usize; STACK_DIMS]>);

impl Shape {
    /// Create an empty shape.
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Push a dimension.
    pub fn push(&mut self, dim: usize) {
        self.0.push(dim);
    }

    /// View shape as a slice.
    pub fn as_slice(&self) -> &[usize] {
        self.0.as_slice()
    }

    /// Number of dimensions in this shape.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Product of all dimensions, or `None` on overflow.
    ///
    /// An empty shape has volume 1.
    pub fn checked_volume(&self) -> Option<usize> {
        self.0
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Product of all dimensions, saturating at `usize::MAX`.
    #[inline]
    pub fn volume(&self) -> usize {
        self.checked_volume().unwrap_or(usize::MAX)
    }

    /// Row-major (C-order) strides, last dimension fastest.
    pub fn strides(&self) -> SmallVec<[usize; STACK_DIMS]> {
        let mut strides: SmallVec<[usize; STACK_DIMS]> = SmallVec::from_elem(1, self.0.len());
        for i in (0..self.0.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.0[i + 1];
        }
        strides
    }

    /// Returns true if any dimension is zero.
    #[inline]
    pub fn has_zero_dim(&self) -> bool {
        self.0.contains(&0)
    }
}

impl Deref for Shape {
    type Target = [usize];

    fn deref(&self) -> &Self::Target {
        self.0.as_slice()
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<[usize]> for Shape {
    fn as_ref(&self) -> &[usize] {
        self.0.as_slice()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(value: Vec<usize>) -> Self {
        Self(value.into_iter().collect())
    }
}

impl From<&[usize]> for Shape {
    fn from(value: &[usize]) -> Self {
        Self(value.iter().copied().collect())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(value: [usize; N]) -> Self {
        Self(value.into_iter().collect())
    }
}

impl FromIterator<usize> for Shape {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_volume() {
        assert_eq!(Shape::from([4, 5, 6]).volume(), 120);
        assert_eq!(Shape::new().volume(), 1);
        assert_eq!(Shape::from([usize::MAX, 2]).checked_volume(), None);
    }

    #[test]
    fn test_shape_strides() {
        let shape = Shape::from([2, 3, 4]);
        assert_eq!(shape.strides().as_slice(), &[12, 4, 1]);
        assert_eq!(Shape::from([7]).strides().as_slice(), &[1]);
    }

    #[test]
    fn test_shape_zero_dim() {
        assert!(Shape::from([3, 0]).has_zero_dim());
        assert!(!Shape::from([3, 1]).has_zero_dim());
    }
}
