//! Error types for spconv

use crate::sparse::RulebookKey;
use thiserror::Error;

/// Result type alias using spconv's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in spconv operations
///
/// Variants fall into four groups:
///
/// - configuration errors (bad shapes, channel counts, geometry, coordinates),
///   detected before any compute starts
/// - [`Error::MissingRulebook`] for inverse convolutions without a cached
///   forward rulebook
/// - [`Error::Integrity`] when a rulebook and the tensors it is applied to
///   disagree; this indicates a bug in the builder or its caller
/// - [`Error::OutOfMemory`] when a feature or coordinate buffer cannot be
///   allocated
#[derive(Error, Debug)]
pub enum Error {
    /// Shape mismatch in an operation
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Channel count of features does not match the weight or bias
    #[error("Channel mismatch in '{op}': expected {expected} channels, got {got}")]
    ChannelMismatch {
        /// The operation name
        op: &'static str,
        /// Channel count required by the operation
        expected: usize,
        /// Channel count supplied
        got: usize,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// The same coordinate appears more than once in a coordinate list
    #[error("Duplicate coordinate {coord:?} at rows {first} and {second}")]
    DuplicateCoordinate {
        /// The repeated coordinate (batch index first)
        coord: Vec<i32>,
        /// Row of the first occurrence
        first: usize,
        /// Row of the repeated occurrence
        second: usize,
    },

    /// A coordinate lies outside the spatial shape or batch range
    #[error("Coordinate {coord:?} out of bounds for batch size {batch_size} and spatial shape {spatial_shape:?}")]
    CoordinateOutOfBounds {
        /// The offending coordinate (batch index first)
        coord: Vec<i32>,
        /// Declared batch size
        batch_size: usize,
        /// Declared spatial shape
        spatial_shape: Vec<usize>,
    },

    /// A cached rulebook exists for the key but was built for different coordinates
    #[error("Rulebook under key {key} does not match the input coordinates: {reason}")]
    RulebookMismatch {
        /// The cache key that was looked up
        key: RulebookKey,
        /// Description of the mismatch
        reason: String,
    },

    /// Inverse convolution requested without a matching forward rulebook
    #[error("No cached forward rulebook for key {key}")]
    MissingRulebook {
        /// The forward key that was looked up
        key: RulebookKey,
    },

    /// Rulebook references a site outside the active-site range
    #[error("Rulebook integrity violation: {reason}")]
    Integrity {
        /// Description of the violation
        reason: String,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an integrity error and log it
    pub fn integrity(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::error!(%reason, "rulebook integrity violation");
        Self::Integrity { reason }
    }

    /// Returns true for errors caused by malformed arguments or geometry
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::ChannelMismatch { .. }
                | Self::InvalidArgument { .. }
                | Self::DuplicateCoordinate { .. }
                | Self::CoordinateOutOfBounds { .. }
                | Self::RulebookMismatch { .. }
        )
    }

    /// Returns true for rulebook integrity violations
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::shape_mismatch(&[2, 3], &[3, 2]).is_configuration());
        assert!(Error::invalid_argument("stride", "must be > 0").is_configuration());
        assert!(Error::integrity("pair out of range").is_integrity());
        assert!(!Error::OutOfMemory { size: 16 }.is_configuration());
        assert!(!Error::OutOfMemory { size: 16 }.is_integrity());
    }

    #[test]
    fn test_error_display() {
        let err = Error::ChannelMismatch {
            op: "sparse_conv",
            expected: 4,
            got: 3,
        };
        assert_eq!(
            err.to_string(),
            "Channel mismatch in 'sparse_conv': expected 4 channels, got 3"
        );
    }
}
