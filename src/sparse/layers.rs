//! Layer wrappers around [`SparseConvOps`]
//!
//! A layer owns its parameters and rulebook tag and forwards to a client.
//! Sequencing layers into a network is left to the caller.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::conv_common::{validate_bias_length, validate_weight};
use crate::ops::{ConvGeometry, SparseConvOps};
use crate::sparse::{ConvMode, SparseConvTensor};
use crate::tensor::{ChannelOrder, DenseTensor, FeatureMatrix};
use std::sync::Arc;

/// Sparse convolution layer
///
/// Holds `weight` (`[*kernel_size, C_in, C_out]` or
/// `[kernel_volume, C_in, C_out]`), an optional `[C_out]` bias, the geometry,
/// the mode and the rulebook tag.
#[derive(Debug, Clone)]
pub struct SparseConv<T> {
    weight: DenseTensor<T>,
    bias: Option<DenseTensor<T>>,
    geometry: ConvGeometry,
    mode: ConvMode,
    tag: Arc<str>,
}

impl<T: Element> SparseConv<T> {
    /// Create a layer, validating the parameter shapes against the geometry
    pub fn new(
        weight: DenseTensor<T>,
        bias: Option<DenseTensor<T>>,
        geometry: ConvGeometry,
        mode: ConvMode,
        tag: impl Into<Arc<str>>,
    ) -> Result<Self> {
        const OP: &str = "SparseConv";
        geometry.validate(geometry.ndim(), OP)?;
        let n = weight.ndim();
        if n < 3 {
            return Err(Error::invalid_argument(
                "weight",
                format!("expected [*kernel_size, C_in, C_out], got {:?}", weight.shape()),
            ));
        }
        let (_, c_out) = validate_weight(weight.shape(), &geometry, weight.shape()[n - 2], OP)?;
        if let Some(bias) = &bias {
            validate_bias_length(bias.shape(), c_out, OP)?;
        }
        Ok(Self {
            weight,
            bias,
            geometry,
            mode,
            tag: tag.into(),
        })
    }

    /// Submanifold layer: stride 1, padding `k / 2`, dilation 1
    pub fn submanifold(
        weight: DenseTensor<T>,
        bias: Option<DenseTensor<T>>,
        kernel_size: &[usize],
        tag: impl Into<Arc<str>>,
    ) -> Result<Self> {
        let ndim = kernel_size.len();
        let padding: Vec<usize> = kernel_size.iter().map(|&k| k / 2).collect();
        let geometry = ConvGeometry::new(kernel_size, &vec![1; ndim], &padding, &vec![1; ndim]);
        Self::new(weight, bias, geometry, ConvMode::Submanifold, tag)
    }

    /// Regular (strided) layer
    pub fn regular(
        weight: DenseTensor<T>,
        bias: Option<DenseTensor<T>>,
        geometry: ConvGeometry,
        tag: impl Into<Arc<str>>,
    ) -> Result<Self> {
        Self::new(weight, bias, geometry, ConvMode::Regular, tag)
    }

    /// Inverse layer undoing the regular layer with the same tag and geometry
    pub fn inverse(
        weight: DenseTensor<T>,
        bias: Option<DenseTensor<T>>,
        geometry: ConvGeometry,
        tag: impl Into<Arc<str>>,
    ) -> Result<Self> {
        Self::new(weight, bias, geometry, ConvMode::Inverse, tag)
    }

    /// Transposed (upsampling) layer
    pub fn transposed(
        weight: DenseTensor<T>,
        bias: Option<DenseTensor<T>>,
        geometry: ConvGeometry,
        tag: impl Into<Arc<str>>,
    ) -> Result<Self> {
        Self::new(weight, bias, geometry, ConvMode::Transposed, tag)
    }

    /// Weight tensor
    pub fn weight(&self) -> &DenseTensor<T> {
        &self.weight
    }

    /// Bias, if any
    pub fn bias(&self) -> Option<&DenseTensor<T>> {
        self.bias.as_ref()
    }

    /// Geometry
    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    /// Mode
    pub fn mode(&self) -> ConvMode {
        self.mode
    }

    /// Rulebook tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Input channel count
    pub fn in_channels(&self) -> usize {
        let shape = self.weight.shape();
        shape[shape.len() - 2]
    }

    /// Output channel count
    pub fn out_channels(&self) -> usize {
        let shape = self.weight.shape();
        shape[shape.len() - 1]
    }

    /// Apply the layer
    pub fn forward<C: SparseConvOps<T>>(
        &self,
        client: &C,
        input: &SparseConvTensor<T>,
    ) -> Result<SparseConvTensor<T>> {
        let (weight, bias) = (&self.weight, self.bias.as_ref());
        match self.mode {
            ConvMode::Regular => client.sparse_conv(input, weight, bias, &self.geometry, &self.tag),
            ConvMode::Submanifold => {
                client.submanifold_conv(input, weight, bias, &self.geometry, &self.tag)
            }
            ConvMode::Inverse => client.inverse_conv(input, weight, bias, &self.geometry, &self.tag),
            ConvMode::Transposed => {
                client.transposed_conv(input, weight, bias, &self.geometry, &self.tag)
            }
        }
    }

    /// Gradients for a previous [`SparseConv::forward`] on `input`
    ///
    /// Returns `(grad_input, grad_weight, grad_bias)`; `grad_bias` is `None`
    /// for layers without bias.
    pub fn backward<C: SparseConvOps<T>>(
        &self,
        client: &C,
        input: &SparseConvTensor<T>,
        grad_output: &FeatureMatrix<T>,
    ) -> Result<(FeatureMatrix<T>, DenseTensor<T>, Option<DenseTensor<T>>)> {
        let rulebook = client.get_or_build_rulebook(input, &self.geometry, self.mode, &self.tag)?;
        let (grad_input, grad_weight, grad_bias) =
            client.sparse_conv_backward(input, &self.weight, grad_output, &rulebook)?;
        Ok((grad_input, grad_weight, self.bias.as_ref().map(|_| grad_bias)))
    }
}

/// Sparse max pooling layer
#[derive(Debug, Clone)]
pub struct SparseMaxPool {
    geometry: ConvGeometry,
    tag: Arc<str>,
}

impl SparseMaxPool {
    /// Create a pooling layer
    pub fn new(geometry: ConvGeometry, tag: impl Into<Arc<str>>) -> Result<Self> {
        geometry.validate(geometry.ndim(), "SparseMaxPool")?;
        Ok(Self {
            geometry,
            tag: tag.into(),
        })
    }

    /// Window `k`, stride `k`, no padding in every dimension
    pub fn uniform(ndim: usize, kernel_size: usize, tag: impl Into<Arc<str>>) -> Result<Self> {
        Self::new(ConvGeometry::uniform(ndim, kernel_size, kernel_size, 0, 1), tag)
    }

    /// Geometry
    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    /// Apply the layer
    pub fn forward<T: Element, C: SparseConvOps<T>>(
        &self,
        client: &C,
        input: &SparseConvTensor<T>,
    ) -> Result<SparseConvTensor<T>> {
        client.sparse_max_pool(input, &self.geometry, &self.tag)
    }

    /// Input gradient for a previous [`SparseMaxPool::forward`]
    pub fn backward<T: Element, C: SparseConvOps<T>>(
        &self,
        client: &C,
        input: &SparseConvTensor<T>,
        output: &SparseConvTensor<T>,
        grad_output: &FeatureMatrix<T>,
    ) -> Result<FeatureMatrix<T>> {
        let rulebook =
            client.get_or_build_rulebook(input, &self.geometry, ConvMode::Regular, &self.tag)?;
        client.sparse_max_pool_backward(input, output, grad_output, &rulebook)
    }
}

/// Sparse to dense conversion layer
#[derive(Debug, Clone, Copy, Default)]
pub struct ToDense {
    order: ChannelOrder,
}

impl ToDense {
    /// Create a conversion with the given output channel order
    pub fn new(order: ChannelOrder) -> Self {
        Self { order }
    }

    /// Densify `input`
    pub fn forward<T: Element>(&self, input: &SparseConvTensor<T>) -> Result<DenseTensor<T>> {
        input.to_dense(self.order)
    }
}

/// Dense to sparse conversion layer
#[derive(Debug, Clone, Copy)]
pub struct ToSparse {
    order: ChannelOrder,
}

impl Default for ToSparse {
    fn default() -> Self {
        Self::new(ChannelOrder::Last)
    }
}

impl ToSparse {
    /// Create a conversion reading the given input channel order
    pub fn new(order: ChannelOrder) -> Self {
        Self { order }
    }

    /// Sparsify `input`, keeping sites with any nonzero channel
    pub fn forward<T: Element>(&self, input: &DenseTensor<T>) -> Result<SparseConvTensor<T>> {
        SparseConvTensor::from_dense(input, self.order)
    }
}
