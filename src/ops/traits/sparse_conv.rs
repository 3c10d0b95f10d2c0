//! Sparse convolution operations.
//!
//! This module defines the `SparseConvOps` trait: convolution and pooling
//! over [`SparseConvTensor`]s, driven by rulebooks that are built once per
//! `(tag, geometry, mode)` key and reused through the tensor's cache.

use crate::dtype::Element;
use crate::error::Result;
use crate::ops::ConvGeometry;
use crate::sparse::{ConvMode, Rulebook, SparseConvTensor};
use crate::tensor::{DenseTensor, FeatureMatrix};
use std::sync::Arc;

/// Sparse convolution and pooling operations.
///
/// # Memory Layout
///
/// - **Features**: `(N, C_in)` - one row per active site
/// - **Weight**: `(*kernel_size, C_in, C_out)` or `(kernel_volume, C_in, C_out)`,
///   kernel offsets in row-major order (last dimension fastest)
/// - **Bias**: `(C_out,)` - added once per output site
/// - **Output**: `(M, C_out)` - one row per output active site
///
/// # Rulebook keys
///
/// Every convolution takes a `tag`. Together with the geometry and mode it
/// forms the [`RulebookKey`](crate::sparse::RulebookKey) under which the
/// rulebook is cached in the input tensor's cache. Layers that share a tag
/// and geometry at the same resolution share one rulebook; an inverse
/// convolution with the tag of a regular convolution undoes it.
///
/// # Backward
///
/// Forward and backward are separate pure functions. The backward methods
/// take the rulebook used in the forward pass; it can be fetched again with
/// [`SparseConvOps::get_or_build_rulebook`], which returns the cached entry.
pub trait SparseConvOps<T: Element> {
    /// Regular (strided) sparse convolution.
    ///
    /// Produces a new active-site set: every output cell reached by at least
    /// one input site through some kernel offset. Output spatial shape:
    /// `floor((in + 2p - d(k - 1) - 1) / s) + 1` per dimension.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for malformed geometry (wrong arity, zero kernel,
    ///   stride or dilation, empty output)
    /// - `ShapeMismatch` / `ChannelMismatch` for weight or bias shapes
    /// - `RulebookMismatch` if `tag` already names a rulebook built for other
    ///   input coordinates
    fn sparse_conv(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        bias: Option<&DenseTensor<T>>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>>;

    /// Submanifold sparse convolution.
    ///
    /// The output active-site set is the input set; only kernel offsets that
    /// land on an active site contribute. Requires stride 1.
    fn submanifold_conv(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        bias: Option<&DenseTensor<T>>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>>;

    /// Inverse sparse convolution.
    ///
    /// Reuses the regular (or submanifold) rulebook cached under
    /// `(tag, geometry)` with input and output swapped. The output has the
    /// coordinates the forward convolution started from.
    ///
    /// # Errors
    ///
    /// - `MissingRulebook` if no forward rulebook is cached for the key
    /// - `RulebookMismatch` if the input is not the forward output
    fn inverse_conv(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        bias: Option<&DenseTensor<T>>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>>;

    /// Transposed (upsampling) sparse convolution.
    ///
    /// Generates new output sites `input * stride - padding + k * dilation`.
    /// Output spatial shape: `(in - 1) s - 2p + d(k - 1) + 1`.
    fn transposed_conv(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        bias: Option<&DenseTensor<T>>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>>;

    /// Sparse max pooling.
    ///
    /// Uses a regular-mode rulebook and takes the per-channel maximum over
    /// the inputs paired with each output site.
    fn sparse_max_pool(
        &self,
        input: &SparseConvTensor<T>,
        geometry: &ConvGeometry,
        tag: &str,
    ) -> Result<SparseConvTensor<T>>;

    /// Gradients of a sparse convolution.
    ///
    /// Returns `(grad_input, grad_weight, grad_bias)` with the shapes of the
    /// input features, the weight and `(C_out,)`.
    fn sparse_conv_backward(
        &self,
        input: &SparseConvTensor<T>,
        weight: &DenseTensor<T>,
        grad_output: &FeatureMatrix<T>,
        rulebook: &Rulebook,
    ) -> Result<(FeatureMatrix<T>, DenseTensor<T>, DenseTensor<T>)>;

    /// Gradient of sparse max pooling with respect to its input features.
    fn sparse_max_pool_backward(
        &self,
        input: &SparseConvTensor<T>,
        output: &SparseConvTensor<T>,
        grad_output: &FeatureMatrix<T>,
        rulebook: &Rulebook,
    ) -> Result<FeatureMatrix<T>>;

    /// Cached rulebook for `(tag, geometry, mode)`, building it on a miss.
    ///
    /// Inverse mode never builds from geometry: it derives the rulebook from
    /// the cached forward one.
    fn get_or_build_rulebook(
        &self,
        input: &SparseConvTensor<T>,
        geometry: &ConvGeometry,
        mode: ConvMode,
        tag: &str,
    ) -> Result<Arc<Rulebook>>;
}
