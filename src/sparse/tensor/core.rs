//! Core SparseConvTensor implementation: construction, accessors, cache

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::sparse::{CoordinateSet, Rulebook, RulebookCache, RulebookKey};
use crate::tensor::{FeatureMatrix, Shape};
use std::sync::Arc;

/// Sparse tensor for convolution: active-site features plus coordinates
///
/// Row `i` of the feature matrix belongs to coordinate row `i`; the two stay
/// aligned for the lifetime of the value. Operations that produce a new
/// active-site set return a new tensor and never mutate their input.
///
/// The rulebook cache is shared, not copied: every tensor produced by a
/// convolution or pooling op on this tensor sees the same cache, so a later
/// inverse convolution finds the forward rulebook it needs.
///
/// # Example
///
/// ```
/// # use spconv::prelude::*;
/// // two active sites in a 4x4 grid, one channel
/// let features = FeatureMatrix::from_slice(&[1.0f32, 2.0], 2, 1)?;
/// let x = SparseConvTensor::new(features, vec![0, 0, 0, 0, 1, 1], [4, 4], 1)?;
/// assert_eq!(x.num_active(), 2);
/// assert_eq!(x.spatial_size(), 16);
/// # Ok::<(), spconv::error::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SparseConvTensor<T> {
    features: FeatureMatrix<T>,
    sites: Arc<CoordinateSet>,
    cache: RulebookCache,
}

impl<T: Element> SparseConvTensor<T> {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a sparse tensor from features and a flat coordinate array
    ///
    /// `indices` holds `N` rows of `(batch, x_1, ..., x_k)`; `features` must
    /// have `N` rows. Coordinates are validated (bounds, uniqueness). Rows
    /// whose features are all zero are kept: a site is active because it is
    /// listed, not because of its value.
    pub fn new(
        features: FeatureMatrix<T>,
        indices: Vec<i32>,
        spatial_shape: impl Into<Shape>,
        batch_size: usize,
    ) -> Result<Self> {
        let sites = CoordinateSet::new(indices, spatial_shape, batch_size)?;
        Self::from_parts(features, Arc::new(sites), RulebookCache::new())
    }

    /// Assemble a tensor from already validated coordinates and a cache
    pub fn from_parts(
        features: FeatureMatrix<T>,
        sites: Arc<CoordinateSet>,
        cache: RulebookCache,
    ) -> Result<Self> {
        if features.rows() != sites.len() {
            return Err(Error::shape_mismatch(
                &[sites.len(), features.cols()],
                &features.shape(),
            ));
        }
        Ok(Self {
            features,
            sites,
            cache,
        })
    }

    /// Tensor over `sites` with new features, sharing this tensor's cache
    pub(crate) fn derive(&self, features: FeatureMatrix<T>, sites: Arc<CoordinateSet>) -> Result<Self> {
        Self::from_parts(features, sites, self.cache.clone())
    }

    /// Same coordinates and cache, new features
    ///
    /// Used after pointwise operations (activations, normalization) that
    /// change feature values but not the active-site set.
    pub fn with_features(&self, features: FeatureMatrix<T>) -> Result<Self> {
        self.derive(features, Arc::clone(&self.sites))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Feature matrix `[N, C]`
    #[inline]
    pub fn features(&self) -> &FeatureMatrix<T> {
        &self.features
    }

    /// Consume the tensor and return its features
    pub fn into_features(self) -> FeatureMatrix<T> {
        self.features
    }

    /// Active-site coordinate set
    #[inline]
    pub fn sites(&self) -> &Arc<CoordinateSet> {
        &self.sites
    }

    /// Flat coordinate array, `N x (ndim + 1)`
    #[inline]
    pub fn indices(&self) -> &[i32] {
        self.sites.as_slice()
    }

    /// Spatial shape
    #[inline]
    pub fn spatial_shape(&self) -> &Shape {
        self.sites.spatial_shape()
    }

    /// Batch size
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.sites.batch_size()
    }

    /// Number of spatial dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.sites.ndim()
    }

    /// Number of active sites
    #[inline]
    pub fn num_active(&self) -> usize {
        self.sites.len()
    }

    /// Number of feature channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.features.cols()
    }

    /// Product of the spatial shape
    pub fn spatial_size(&self) -> usize {
        self.sites.spatial_shape().volume()
    }

    /// Fraction of grid cells that are active: `N / (spatial_size * batch)`
    pub fn density(&self) -> f64 {
        let cells = self.spatial_size() as f64 * self.batch_size() as f64;
        if cells == 0.0 {
            0.0
        } else {
            self.num_active() as f64 / cells
        }
    }

    /// `1 - density()`
    pub fn sparsity(&self) -> f64 {
        1.0 - self.density()
    }

    // =========================================================================
    // Rulebook cache
    // =========================================================================

    /// Shared rulebook cache
    #[inline]
    pub fn cache(&self) -> &RulebookCache {
        &self.cache
    }

    /// Cached rulebook for `key`
    pub fn find_rulebook(&self, key: &RulebookKey) -> Option<Arc<Rulebook>> {
        self.cache.get(key)
    }

    /// Cache `rulebook` under `key`, returning the cached entry
    pub fn cache_rulebook(&self, key: RulebookKey, rulebook: Arc<Rulebook>) -> Arc<Rulebook> {
        self.cache.insert(key, rulebook)
    }
}
