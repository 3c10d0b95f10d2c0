//! Row-major feature matrix: one row per active site

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::allocator::{alloc_vec, alloc_zeroed};

/// Row-major `rows x cols` matrix of features
///
/// Row `i` holds the channels of active site `i`. The matrix owns its
/// storage; gather and scatter helpers live in the CPU kernels.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Element> FeatureMatrix<T> {
    /// Create a zero-filled matrix
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or(Error::OutOfMemory { size: usize::MAX })?;
        Ok(Self {
            data: alloc_zeroed(len)?,
            rows,
            cols,
        })
    }

    /// Wrap an existing row-major buffer
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::shape_mismatch(&[rows, cols], &[data.len()]));
        }
        Ok(Self { data, rows, cols })
    }

    /// Copy a row-major slice
    pub fn from_slice(data: &[T], rows: usize, cols: usize) -> Result<Self> {
        let mut buf = alloc_vec(data.len())?;
        buf.extend_from_slice(data);
        Self::from_vec(buf, rows, cols)
    }

    /// Build from a list of equally sized rows
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = alloc_vec(rows.len() * cols)?;
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::invalid_argument(
                    "rows",
                    format!("row {} has {} columns, expected {}", i, row.len(), cols),
                ));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    /// Number of rows (active sites)
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (channels)
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Shape as `[rows, cols]`
    #[inline]
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    /// Row `i` as a slice
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Row `i` as a mutable slice
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Underlying row-major storage
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Underlying row-major storage, mutable
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the matrix and return its storage
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Returns true if every element equals zero
    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|v| v.to_f64() == 0.0)
    }
}
