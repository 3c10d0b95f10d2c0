//! Active-site coordinate sets

use crate::error::{Error, Result};
use crate::sparse::hash_grid::{GridPolicy, HashGrid};
use crate::tensor::Shape;

/// Coordinates of the active sites of one sparse tensor
///
/// Stored as a flat row-major `i32` array of `N x (ndim + 1)` entries; column
/// 0 is the batch index, columns `1..=ndim` are spatial coordinates. Row `i`
/// is active site `i`. Coordinates are unique and in bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinateSet {
    indices: Vec<i32>,
    spatial_shape: Shape,
    batch_size: usize,
}

impl CoordinateSet {
    /// Create a validated coordinate set
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `indices.len()` is not a multiple of `ndim + 1`
    ///   or the spatial shape is empty
    /// - `CoordinateOutOfBounds` for negative or too-large coordinates
    /// - `DuplicateCoordinate` if a coordinate appears twice
    pub fn new(indices: Vec<i32>, spatial_shape: impl Into<Shape>, batch_size: usize) -> Result<Self> {
        let set = Self::new_unchecked(indices, spatial_shape.into(), batch_size)?;
        set.validate_bounds()?;
        set.validate_unique()?;
        Ok(set)
    }

    /// Create a coordinate set whose rows are known to be valid and unique
    ///
    /// Only the layout is checked. Used by the rulebook builder, which
    /// produces coordinates through a hash grid.
    pub(crate) fn new_unchecked(indices: Vec<i32>, spatial_shape: Shape, batch_size: usize) -> Result<Self> {
        let ndim = spatial_shape.ndim();
        if ndim == 0 {
            return Err(Error::invalid_argument(
                "spatial_shape",
                "sparse tensors need at least one spatial dimension",
            ));
        }
        if spatial_shape
            .checked_volume()
            .and_then(|v| v.checked_mul(batch_size))
            .is_none_or(|v| v > i64::MAX as usize)
        {
            return Err(Error::invalid_argument(
                "spatial_shape",
                format!("grid {:?} x batch {} is too large", spatial_shape, batch_size),
            ));
        }
        if !indices.len().is_multiple_of(ndim + 1) {
            return Err(Error::invalid_argument(
                "indices",
                format!(
                    "length {} is not a multiple of ndim + 1 = {}",
                    indices.len(),
                    ndim + 1
                ),
            ));
        }
        Ok(Self {
            indices,
            spatial_shape,
            batch_size,
        })
    }

    /// Create an empty coordinate set
    pub fn empty(spatial_shape: impl Into<Shape>, batch_size: usize) -> Result<Self> {
        Self::new_unchecked(Vec::new(), spatial_shape.into(), batch_size)
    }

    fn validate_bounds(&self) -> Result<()> {
        for coord in self.iter() {
            if !self.contains_in_bounds(coord) {
                return Err(Error::CoordinateOutOfBounds {
                    coord: coord.to_vec(),
                    batch_size: self.batch_size,
                    spatial_shape: self.spatial_shape.to_vec(),
                });
            }
        }
        Ok(())
    }

    fn validate_unique(&self) -> Result<()> {
        let mut grid = HashGrid::new(&self.spatial_shape, self.batch_size, GridPolicy::default())?;
        for (row, coord) in self.iter().enumerate() {
            let index = grid.insert_or_get(coord)?;
            if index != row {
                return Err(Error::DuplicateCoordinate {
                    coord: coord.to_vec(),
                    first: index,
                    second: row,
                });
            }
        }
        Ok(())
    }

    /// Returns true if `coord` lies inside the batch range and spatial shape
    #[inline]
    pub fn contains_in_bounds(&self, coord: &[i32]) -> bool {
        coord.len() == self.row_len()
            && coord[0] >= 0
            && (coord[0] as usize) < self.batch_size
            && coord[1..]
                .iter()
                .zip(self.spatial_shape.iter())
                .all(|(&c, &dim)| c >= 0 && (c as usize) < dim)
    }

    /// Number of active sites
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len() / self.row_len()
    }

    /// Returns true if there are no active sites
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of spatial dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.spatial_shape.ndim()
    }

    /// Entries per coordinate row (`ndim + 1`)
    #[inline]
    pub fn row_len(&self) -> usize {
        self.spatial_shape.ndim() + 1
    }

    /// Spatial shape of the grid
    #[inline]
    pub fn spatial_shape(&self) -> &Shape {
        &self.spatial_shape
    }

    /// Batch size
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Coordinate of active site `i` (batch index first)
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`.
    #[inline]
    pub fn coord(&self, i: usize) -> &[i32] {
        let w = self.row_len();
        &self.indices[i * w..(i + 1) * w]
    }

    /// Iterate over coordinates in active-site order
    pub fn iter(&self) -> std::slice::ChunksExact<'_, i32> {
        self.indices.chunks_exact(self.row_len())
    }

    /// Flat row-major coordinate array
    #[inline]
    pub fn as_slice(&self) -> &[i32] {
        &self.indices
    }

    /// Returns true if both sets hold the same coordinates in the same order
    pub fn same_sites(&self, other: &CoordinateSet) -> bool {
        self.spatial_shape == other.spatial_shape
            && self.batch_size == other.batch_size
            && self.indices == other.indices
    }
}
