//! Shared validation and geometry helpers for sparse convolution.
//!
//! Everything here runs before any compute: argument arity, positivity,
//! output spatial shapes and weight/bias layout checks.

use crate::error::{Error, Result};
use crate::sparse::ConvMode;
use crate::tensor::Shape;
use smallvec::SmallVec;

/// Per-dimension kernel index, one entry per spatial dimension.
pub type KernelIndex = SmallVec<[usize; 4]>;

/// Validates that a hyperparameter is non-zero.
#[inline]
pub fn validate_positive(values: &[usize], name: &'static str, op: &'static str) -> Result<()> {
    if let Some(dim) = values.iter().position(|&v| v == 0) {
        return Err(Error::InvalidArgument {
            arg: name,
            reason: format!("{} requires {} > 0, got 0 in dim {}", op, name, dim),
        });
    }
    Ok(())
}

/// Validates that a per-dimension parameter has one entry per spatial dim.
#[inline]
pub fn validate_arity(values: &[usize], ndim: usize, name: &'static str, op: &'static str) -> Result<()> {
    if values.len() != ndim {
        return Err(Error::InvalidArgument {
            arg: name,
            reason: format!(
                "{} expects {} with {} entries, got {}",
                op,
                name,
                ndim,
                values.len()
            ),
        });
    }
    Ok(())
}

/// Validates that bias has the correct length.
#[inline]
pub fn validate_bias_length(bias_shape: &[usize], c_out: usize, op: &'static str) -> Result<()> {
    if bias_shape != [c_out] {
        return Err(Error::InvalidArgument {
            arg: "bias",
            reason: format!(
                "{} bias should have shape [C_out] = [{}], got {:?}",
                op, c_out, bias_shape
            ),
        });
    }
    Ok(())
}

/// Computes output size for a single dimension in convolution.
///
/// output_size = floor((input_size + pad_before + pad_after - dilation * (kernel_size - 1) - 1) / stride + 1)
#[inline]
pub fn compute_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
    pad_before: usize,
    pad_after: usize,
) -> usize {
    let effective_kernel = dilation * (kernel_size - 1) + 1;
    let padded_size = input_size + pad_before + pad_after;
    if padded_size < effective_kernel {
        0
    } else {
        (padded_size - effective_kernel) / stride + 1
    }
}

/// Computes output size for a single dimension in transposed convolution.
///
/// output_size = (input_size - 1) * stride - 2 * padding + dilation * (kernel_size - 1) + 1
#[inline]
pub fn compute_transposed_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
    padding: usize,
) -> usize {
    if input_size == 0 {
        return 0;
    }
    let full = (input_size - 1) * stride + dilation * (kernel_size - 1) + 1;
    full.saturating_sub(2 * padding)
}

/// Kernel shape, stride, padding and dilation of a sparse convolution.
///
/// Every field holds one entry per spatial dimension. Padding is symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConvGeometry {
    /// Kernel extent per dimension
    pub kernel_size: Shape,
    /// Stride per dimension
    pub stride: Shape,
    /// Zero padding per dimension
    pub padding: Shape,
    /// Dilation per dimension
    pub dilation: Shape,
}

impl ConvGeometry {
    /// Create a geometry from explicit per-dimension values
    pub fn new(kernel_size: &[usize], stride: &[usize], padding: &[usize], dilation: &[usize]) -> Self {
        Self {
            kernel_size: kernel_size.into(),
            stride: stride.into(),
            padding: padding.into(),
            dilation: dilation.into(),
        }
    }

    /// Same kernel, stride, padding and dilation in every dimension
    pub fn uniform(ndim: usize, kernel_size: usize, stride: usize, padding: usize, dilation: usize) -> Self {
        Self {
            kernel_size: std::iter::repeat_n(kernel_size, ndim).collect(),
            stride: std::iter::repeat_n(stride, ndim).collect(),
            padding: std::iter::repeat_n(padding, ndim).collect(),
            dilation: std::iter::repeat_n(dilation, ndim).collect(),
        }
    }

    /// Stride 1, "same" padding for an odd kernel; the usual submanifold setup
    pub fn submanifold(ndim: usize, kernel_size: usize) -> Self {
        Self::uniform(ndim, kernel_size, 1, kernel_size / 2, 1)
    }

    /// Number of spatial dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.kernel_size.ndim()
    }

    /// Number of kernel offsets (product of the kernel extents)
    #[inline]
    pub fn kernel_volume(&self) -> usize {
        self.kernel_size.volume()
    }

    /// Checks arity against `ndim` and positivity of kernel, stride and dilation
    pub fn validate(&self, ndim: usize, op: &'static str) -> Result<()> {
        if ndim == 0 {
            return Err(Error::invalid_argument(
                "spatial_shape",
                format!("{} needs at least one spatial dimension", op),
            ));
        }
        validate_arity(&self.kernel_size, ndim, "kernel_size", op)?;
        validate_arity(&self.stride, ndim, "stride", op)?;
        validate_arity(&self.padding, ndim, "padding", op)?;
        validate_arity(&self.dilation, ndim, "dilation", op)?;
        validate_positive(&self.kernel_size, "kernel_size", op)?;
        validate_positive(&self.stride, "stride", op)?;
        validate_positive(&self.dilation, "dilation", op)?;
        if self.kernel_size.checked_volume().is_none_or(|v| v > u32::MAX as usize) {
            return Err(Error::invalid_argument(
                "kernel_size",
                format!("{} kernel volume too large: {:?}", op, self.kernel_size),
            ));
        }
        Ok(())
    }

    /// Kernel indices in canonical row-major order (last dimension fastest)
    ///
    /// Offset `o` of a rulebook and slice `o` of the weight tensor both refer
    /// to entry `o` of this list.
    pub fn kernel_indices(&self) -> Vec<KernelIndex> {
        let ndim = self.ndim();
        let volume = self.kernel_volume();
        let mut out = Vec::with_capacity(volume);
        let mut current: KernelIndex = SmallVec::from_elem(0, ndim);
        for _ in 0..volume {
            out.push(current.clone());
            for d in (0..ndim).rev() {
                current[d] += 1;
                if current[d] < self.kernel_size[d] {
                    break;
                }
                current[d] = 0;
            }
        }
        out
    }

    /// Output spatial shape for the given mode
    ///
    /// Inverse mode has no geometric rule of its own; its output shape comes
    /// from the cached forward rulebook, so it is rejected here.
    pub fn output_spatial_shape(&self, input: &[usize], mode: ConvMode, op: &'static str) -> Result<Shape> {
        self.validate(input.len(), op)?;
        let out: Shape = match mode {
            ConvMode::Regular => (0..input.len())
                .map(|d| {
                    compute_output_size(
                        input[d],
                        self.kernel_size[d],
                        self.stride[d],
                        self.dilation[d],
                        self.padding[d],
                        self.padding[d],
                    )
                })
                .collect(),
            ConvMode::Submanifold => {
                if self.stride.iter().any(|&s| s != 1) {
                    return Err(Error::invalid_argument(
                        "stride",
                        format!("{} submanifold mode requires stride 1, got {:?}", op, self.stride),
                    ));
                }
                input.into()
            }
            ConvMode::Transposed => (0..input.len())
                .map(|d| {
                    compute_transposed_output_size(
                        input[d],
                        self.kernel_size[d],
                        self.stride[d],
                        self.dilation[d],
                        self.padding[d],
                    )
                })
                .collect(),
            ConvMode::Inverse => {
                return Err(Error::invalid_argument(
                    "mode",
                    format!("{} inverse mode takes its output shape from a cached rulebook", op),
                ));
            }
        };
        if out.has_zero_dim() {
            return Err(Error::InvalidArgument {
                arg: "kernel_size",
                reason: format!(
                    "{} produces an empty output: input {:?}, geometry {:?}",
                    op, input, self
                ),
            });
        }
        if out.checked_volume().is_none_or(|v| v > i32::MAX as usize) {
            return Err(Error::invalid_argument(
                "spatial_shape",
                format!("{} output spatial shape {:?} is too large", op, out),
            ));
        }
        Ok(out)
    }
}

/// Validates a weight shape and returns `(c_in, c_out)`.
///
/// Accepted layouts are `[*kernel_size, C_in, C_out]` and
/// `[kernel_volume, C_in, C_out]`.
pub fn validate_weight(
    weight_shape: &[usize],
    geometry: &ConvGeometry,
    c_in: usize,
    op: &'static str,
) -> Result<(usize, usize)> {
    let n = weight_shape.len();
    let leading_ok = n >= 3
        && (weight_shape[..n - 2] == *geometry.kernel_size.as_slice()
            || (n == 3 && weight_shape[0] == geometry.kernel_volume()));
    if !leading_ok {
        let mut expected: Vec<usize> = geometry.kernel_size.to_vec();
        expected.extend_from_slice(&[c_in, weight_shape.last().copied().unwrap_or(0)]);
        return Err(Error::shape_mismatch(&expected, weight_shape));
    }
    let weight_c_in = weight_shape[n - 2];
    if weight_c_in != c_in {
        return Err(Error::ChannelMismatch {
            op,
            expected: weight_c_in,
            got: c_in,
        });
    }
    Ok((weight_c_in, weight_shape[n - 1]))
}
