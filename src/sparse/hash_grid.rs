//! Coordinate hash grid: coordinate -> active-site index
//!
//! A grid is built for one set of coordinates (an input tensor during
//! validation, or the output of one rulebook build) and owned by that build.
//! Indices are handed out sequentially in insertion order, so the caller
//! controls determinism by controlling insertion order.
//!
//! Keys linearize the full coordinate, batch index included:
//!
//! ```text
//! key = ((batch * D1 + x1) * D2 + x2) * ... * Dk + xk
//! ```
//!
//! so two sites that share spatial coordinates in different batch elements
//! never alias.

use crate::error::{Error, Result};
use crate::runtime::allocator::alloc_filled;
use crate::tensor::Shape;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Default upper bound on `batch * spatial volume` for a flat-array grid.
pub const DEFAULT_DENSE_LIMIT: usize = 1 << 22;

const ABSENT: u32 = u32::MAX;

/// Backing-store selection for [`HashGrid`]
///
/// The choice never changes results, only memory use and lookup cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridPolicy {
    /// Flat array when `batch * volume <= dense_limit`, hash table otherwise
    Auto {
        /// Largest grid volume that uses a flat array
        dense_limit: usize,
    },
    /// Always use a flat array indexed by the linearized coordinate
    Dense,
    /// Always use a hash table
    Hash,
}

impl Default for GridPolicy {
    fn default() -> Self {
        GridPolicy::Auto {
            dense_limit: DEFAULT_DENSE_LIMIT,
        }
    }
}

impl GridPolicy {
    /// Returns true if a grid of `volume` cells should use a flat array
    pub fn use_dense(&self, volume: usize) -> bool {
        match *self {
            GridPolicy::Auto { dense_limit } => volume <= dense_limit,
            GridPolicy::Dense => true,
            GridPolicy::Hash => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Backing {
    Dense(Vec<u32>),
    Hash(FxHashMap<u64, u32>),
}

/// Append-only map from coordinates to sequential active-site indices
///
/// Lookups take `&self`, so a finished grid can be shared across threads for
/// concurrent read-only queries.
#[derive(Debug, Clone)]
pub struct HashGrid {
    backing: Backing,
    spatial_shape: Shape,
    batch_size: usize,
    /// Strides for batch followed by each spatial dim
    strides: SmallVec<[u64; 5]>,
    len: usize,
}

impl HashGrid {
    /// Create an empty grid over `batch_size x spatial_shape`
    pub fn new(spatial_shape: &Shape, batch_size: usize, policy: GridPolicy) -> Result<Self> {
        Self::with_capacity(spatial_shape, batch_size, policy, 0)
    }

    /// Create an empty grid, reserving hash capacity for `capacity` sites
    pub fn with_capacity(
        spatial_shape: &Shape,
        batch_size: usize,
        policy: GridPolicy,
        capacity: usize,
    ) -> Result<Self> {
        let total = spatial_shape
            .checked_volume()
            .and_then(|v| v.checked_mul(batch_size))
            .filter(|&v| v <= i64::MAX as usize)
            .ok_or_else(|| {
                Error::invalid_argument(
                    "spatial_shape",
                    format!("grid {:?} x batch {} is too large", spatial_shape, batch_size),
                )
            })?;

        let ndim = spatial_shape.ndim();
        let mut strides: SmallVec<[u64; 5]> = SmallVec::from_elem(1, ndim + 1);
        for d in (0..ndim).rev() {
            strides[d] = strides[d + 1] * spatial_shape[d] as u64;
        }

        let backing = if policy.use_dense(total) {
            Backing::Dense(alloc_filled(total, ABSENT)?)
        } else {
            let mut map = FxHashMap::default();
            map.try_reserve(capacity)
                .map_err(|_| Error::OutOfMemory {
                    size: capacity.saturating_mul(12),
                })?;
            Backing::Hash(map)
        };

        Ok(Self {
            backing,
            spatial_shape: spatial_shape.clone(),
            batch_size,
            strides,
            len: 0,
        })
    }

    /// Number of distinct coordinates inserted
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing was inserted
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the grid uses a flat array
    #[inline]
    pub fn is_dense(&self) -> bool {
        matches!(self.backing, Backing::Dense(_))
    }

    /// Linearized key of an in-bounds coordinate, `None` otherwise
    #[inline]
    pub fn key_of(&self, coord: &[i32]) -> Option<u64> {
        if coord.len() != self.strides.len() || coord[0] < 0 || coord[0] as usize >= self.batch_size {
            return None;
        }
        let mut key = coord[0] as u64 * self.strides[0];
        for d in 0..self.spatial_shape.ndim() {
            let c = coord[d + 1];
            if c < 0 || c as usize >= self.spatial_shape[d] {
                return None;
            }
            key += c as u64 * self.strides[d + 1];
        }
        Some(key)
    }

    /// Write the coordinate for `key` into `out` (length `ndim + 1`)
    #[inline]
    pub fn coord_of(&self, mut key: u64, out: &mut [i32]) {
        for (slot, &stride) in out.iter_mut().zip(self.strides.iter()) {
            *slot = (key / stride) as i32;
            key %= stride;
        }
    }

    /// Index of `coord`, inserting it with the next sequential index if absent
    ///
    /// # Errors
    ///
    /// `CoordinateOutOfBounds` if `coord` is outside the grid.
    pub fn insert_or_get(&mut self, coord: &[i32]) -> Result<usize> {
        let key = self.key_of(coord).ok_or_else(|| Error::CoordinateOutOfBounds {
            coord: coord.to_vec(),
            batch_size: self.batch_size,
            spatial_shape: self.spatial_shape.to_vec(),
        })?;
        self.insert_key_or_get(key)
    }

    /// Index for a linearized key, inserting it if absent
    ///
    /// `key` must come from [`HashGrid::key_of`] on this grid.
    pub fn insert_key_or_get(&mut self, key: u64) -> Result<usize> {
        let next = self.len;
        if next >= ABSENT as usize {
            return Err(Error::invalid_argument(
                "indices",
                format!("more than {} active sites", ABSENT - 1),
            ));
        }
        let index = match &mut self.backing {
            Backing::Dense(cells) => {
                let cell = &mut cells[key as usize];
                if *cell == ABSENT {
                    *cell = next as u32;
                }
                *cell
            }
            Backing::Hash(map) => *map.entry(key).or_insert(next as u32),
        };
        if index as usize == next {
            self.len += 1;
        }
        Ok(index as usize)
    }

    /// Index of `coord`, `None` if absent or out of bounds
    #[inline]
    pub fn get(&self, coord: &[i32]) -> Option<usize> {
        self.key_of(coord).and_then(|key| self.get_key(key))
    }

    /// Index for a linearized key, `None` if absent
    #[inline]
    pub fn get_key(&self, key: u64) -> Option<usize> {
        match &self.backing {
            Backing::Dense(cells) => match cells.get(key as usize) {
                Some(&idx) if idx != ABSENT => Some(idx as usize),
                _ => None,
            },
            Backing::Hash(map) => map.get(&key).map(|&idx| idx as usize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grids() -> Vec<HashGrid> {
        let shape = Shape::from([4, 5]);
        vec![
            HashGrid::new(&shape, 2, GridPolicy::Dense).unwrap(),
            HashGrid::new(&shape, 2, GridPolicy::Hash).unwrap(),
        ]
    }

    #[test]
    fn test_sequential_indices() {
        for mut grid in grids() {
            assert_eq!(grid.insert_or_get(&[0, 1, 2]).unwrap(), 0);
            assert_eq!(grid.insert_or_get(&[1, 3, 4]).unwrap(), 1);
            assert_eq!(grid.insert_or_get(&[0, 1, 2]).unwrap(), 0);
            assert_eq!(grid.len(), 2);
            assert_eq!(grid.get(&[1, 3, 4]), Some(1));
            assert_eq!(grid.get(&[0, 0, 0]), None);
        }
    }

    #[test]
    fn test_batch_index_is_part_of_key() {
        for mut grid in grids() {
            let a = grid.insert_or_get(&[0, 2, 2]).unwrap();
            let b = grid.insert_or_get(&[1, 2, 2]).unwrap();
            assert_ne!(a, b);
            assert_eq!(grid.get(&[1, 2, 2]), Some(b));
        }
    }

    #[test]
    fn test_out_of_bounds() {
        for mut grid in grids() {
            assert!(grid.insert_or_get(&[0, 4, 0]).is_err());
            assert!(grid.insert_or_get(&[2, 0, 0]).is_err());
            assert_eq!(grid.get(&[0, -1, 0]), None);
            assert!(grid.is_empty());
        }
    }

    #[test]
    fn test_key_roundtrip() {
        let grid = HashGrid::new(&Shape::from([3, 4, 5]), 2, GridPolicy::Hash).unwrap();
        let key = grid.key_of(&[1, 2, 3, 4]).unwrap();
        let mut coord = [0i32; 4];
        grid.coord_of(key, &mut coord);
        assert_eq!(coord, [1, 2, 3, 4]);
    }

    #[test]
    fn test_policy_selection() {
        let shape = Shape::from([8, 8]);
        let grid = HashGrid::new(&shape, 1, GridPolicy::Auto { dense_limit: 64 }).unwrap();
        assert!(grid.is_dense());
        let grid = HashGrid::new(&shape, 2, GridPolicy::Auto { dense_limit: 64 }).unwrap();
        assert!(!grid.is_dense());
    }
}
