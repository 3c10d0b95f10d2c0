//! Dense row-major n-dimensional arrays

use super::Shape;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::allocator::alloc_zeroed;

/// Position of the channel axis in a dense spatial array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    /// `[batch, channels, *spatial]`
    #[default]
    First,
    /// `[batch, *spatial, channels]`
    Last,
}

impl ChannelOrder {
    /// Returns the name of the layout for error messages
    pub fn name(&self) -> &'static str {
        match self {
            ChannelOrder::First => "channels_first",
            ChannelOrder::Last => "channels_last",
        }
    }
}

/// Dense row-major array
#[derive(Clone, Debug, PartialEq)]
pub struct DenseTensor<T> {
    shape: Shape,
    data: Vec<T>,
}

impl<T: Element> DenseTensor<T> {
    /// Create a zero-filled array
    pub fn zeros(shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        let numel = shape
            .checked_volume()
            .ok_or(Error::OutOfMemory { size: usize::MAX })?;
        Ok(Self {
            data: alloc_zeroed(numel)?,
            shape,
        })
    }

    /// Wrap a row-major buffer, checking that its length matches the shape
    pub fn from_vec(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if shape.checked_volume() != Some(data.len()) {
            return Err(Error::shape_mismatch(shape.as_slice(), &[data.len()]));
        }
        Ok(Self { shape, data })
    }

    /// Copy a row-major slice
    pub fn from_slice(data: &[T], shape: &[usize]) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Shape of the array
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.shape.as_slice()
    }

    /// Number of dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Total number of elements
    #[inline]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Row-major storage
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Row-major storage, mutable
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the array and return its storage
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Linear offset of a multi-index, `None` if out of bounds
    pub fn offset_of(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.ndim() {
            return None;
        }
        let strides = self.shape.strides();
        let mut offset = 0;
        for ((&i, &dim), &stride) in index.iter().zip(self.shape.iter()).zip(strides.iter()) {
            if i >= dim {
                return None;
            }
            offset += i * stride;
        }
        Some(offset)
    }

    /// Element at a multi-index
    pub fn get(&self, index: &[usize]) -> Option<T> {
        self.offset_of(index).map(|o| self.data[o])
    }

    /// Move the channel axis between position 1 and the last position
    ///
    /// `from` describes the current layout; the result uses the other one.
    /// Arrays with fewer than three dimensions have no spatial axes and are
    /// rejected.
    pub fn swap_channel_order(&self, from: ChannelOrder) -> Result<Self> {
        let ndim = self.ndim();
        if ndim < 3 {
            return Err(Error::invalid_argument(
                "dense",
                format!("expected [batch, *spatial, channels] layout, got {}D", ndim),
            ));
        }
        let batch = self.shape[0];
        let (channels, spatial): (usize, Shape) = match from {
            ChannelOrder::First => (self.shape[1], self.shape[2..].iter().copied().collect()),
            ChannelOrder::Last => (
                self.shape[ndim - 1],
                self.shape[1..ndim - 1].iter().copied().collect(),
            ),
        };
        let volume = spatial.volume();

        let mut out_shape = Shape::new();
        out_shape.push(batch);
        match from {
            ChannelOrder::First => {
                spatial.iter().for_each(|&d| out_shape.push(d));
                out_shape.push(channels);
            }
            ChannelOrder::Last => {
                out_shape.push(channels);
                spatial.iter().for_each(|&d| out_shape.push(d));
            }
        }

        let mut out = alloc_zeroed::<T>(self.data.len())?;
        for b in 0..batch {
            for s in 0..volume {
                for c in 0..channels {
                    let first = (b * channels + c) * volume + s;
                    let last = (b * volume + s) * channels + c;
                    match from {
                        ChannelOrder::First => out[last] = self.data[first],
                        ChannelOrder::Last => out[first] = self.data[last],
                    }
                }
            }
        }
        Self::from_vec(out, out_shape)
    }
}
