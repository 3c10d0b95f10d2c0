//! SparseConvTensor dense conversion: from_dense, to_dense

use super::SparseConvTensor;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::allocator::{alloc_vec, alloc_zeroed};
use crate::sparse::{CoordinateSet, RulebookCache};
use crate::tensor::{ChannelOrder, DenseTensor, FeatureMatrix, Shape};
use std::sync::Arc;

impl<T: Element> SparseConvTensor<T> {
    // =========================================================================
    // Dense Conversion
    // =========================================================================

    /// Create a sparse tensor from a dense array
    ///
    /// `dense` is `[B, *spatial, C]` for [`ChannelOrder::Last`] or
    /// `[B, C, *spatial]` for [`ChannelOrder::First`]. A site is active when
    /// any of its channels is nonzero. Active sites are numbered in
    /// row-major `(batch, spatial)` order.
    pub fn from_dense(dense: &DenseTensor<T>, order: ChannelOrder) -> Result<Self> {
        let owned;
        let last = match order {
            ChannelOrder::Last => {
                if dense.ndim() < 3 {
                    return Err(Error::invalid_argument(
                        "dense",
                        format!("expected [batch, *spatial, channels], got {:?}", dense.shape()),
                    ));
                }
                dense
            }
            ChannelOrder::First => {
                owned = dense.swap_channel_order(ChannelOrder::First)?;
                &owned
            }
        };

        let shape = last.shape();
        let ndim = shape.len() - 2;
        let batch_size = shape[0];
        let channels = shape[ndim + 1];
        let spatial: Shape = shape[1..=ndim].iter().copied().collect();
        let volume = spatial.volume();
        let strides = spatial.strides();

        let span = tracing::debug_span!("from_dense", order = order.name(), batch_size, channels);
        let _guard = span.enter();

        let data = last.as_slice();
        let cells = batch_size * volume;
        let active = (0..cells)
            .filter(|&cell| {
                data[cell * channels..(cell + 1) * channels]
                    .iter()
                    .any(|v| v.to_f64() != 0.0)
            })
            .count();

        let mut indices = alloc_vec(active * (ndim + 1))?;
        let mut features = alloc_vec(active * channels)?;
        for cell in 0..cells {
            let row = &data[cell * channels..(cell + 1) * channels];
            if !row.iter().any(|v| v.to_f64() != 0.0) {
                continue;
            }
            let (b, mut rem) = (cell / volume.max(1), cell % volume.max(1));
            indices.push(b as i32);
            for &stride in strides.iter() {
                indices.push((rem / stride) as i32);
                rem %= stride;
            }
            features.extend_from_slice(row);
        }

        tracing::debug!(active, cells, "dense array converted");
        let sites = CoordinateSet::new_unchecked(indices, spatial, batch_size)?;
        Self::from_parts(
            FeatureMatrix::from_vec(features, active, channels)?,
            Arc::new(sites),
            RulebookCache::new(),
        )
    }

    /// Scatter active-site features into a zero-filled dense array
    ///
    /// Returns `[B, *spatial, C]` for [`ChannelOrder::Last`] and
    /// `[B, C, *spatial]` for [`ChannelOrder::First`].
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if the dense element count overflows or cannot be
    /// allocated.
    pub fn to_dense(&self, order: ChannelOrder) -> Result<DenseTensor<T>> {
        let channels = self.num_channels();
        let spatial = self.spatial_shape();
        let strides = spatial.strides();
        let volume = spatial.volume();
        let batch_size = self.batch_size();

        let mut shape = Shape::new();
        shape.push(batch_size);
        spatial.iter().for_each(|&d| shape.push(d));
        shape.push(channels);

        let len = batch_size
            .checked_mul(volume)
            .and_then(|cells| cells.checked_mul(channels))
            .ok_or(Error::OutOfMemory { size: usize::MAX })?;
        let mut data: Vec<T> = alloc_zeroed(len)?;
        // sites are unique, so every row lands in its own cell
        for (row, coord) in self.sites().iter().enumerate() {
            let mut cell = coord[0] as usize * volume;
            for (&c, &stride) in coord[1..].iter().zip(strides.iter()) {
                cell += c as usize * stride;
            }
            data[cell * channels..(cell + 1) * channels].copy_from_slice(self.features().row(row));
        }

        let dense = DenseTensor::from_vec(data, shape)?;
        match order {
            ChannelOrder::Last => Ok(dense),
            ChannelOrder::First => dense.swap_channel_order(ChannelOrder::Last),
        }
    }
}
