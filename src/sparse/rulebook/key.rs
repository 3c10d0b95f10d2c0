//! Structured rulebook cache keys

use crate::ops::ConvGeometry;
use std::fmt;
use std::sync::Arc;

/// Convolution mode of a rulebook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvMode {
    /// Strided/padded convolution producing a new active-site set
    Regular,
    /// Output sites equal input sites; only existing neighbours pair up
    Submanifold,
    /// Reuses a cached forward rulebook with input and output swapped
    Inverse,
    /// Transposed (upsampling) convolution producing a new active-site set
    Transposed,
}

impl ConvMode {
    /// Returns the mode name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            ConvMode::Regular => "regular",
            ConvMode::Submanifold => "submanifold",
            ConvMode::Inverse => "inverse",
            ConvMode::Transposed => "transposed",
        }
    }

    /// Returns true if the mode creates output coordinates of its own
    pub fn creates_sites(&self) -> bool {
        matches!(self, ConvMode::Regular | ConvMode::Transposed)
    }
}

impl fmt::Display for ConvMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Cache key of a rulebook: user tag, geometry and mode
///
/// Two layers share a rulebook only when all three agree, so unrelated
/// layers that happen to reuse a tag with a different kernel never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RulebookKey {
    tag: Arc<str>,
    geometry: ConvGeometry,
    mode: ConvMode,
}

impl RulebookKey {
    /// Create a key
    pub fn new(tag: impl Into<Arc<str>>, geometry: ConvGeometry, mode: ConvMode) -> Self {
        Self {
            tag: tag.into(),
            geometry,
            mode,
        }
    }

    /// User tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Convolution geometry
    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    /// Convolution mode
    pub fn mode(&self) -> ConvMode {
        self.mode
    }

    /// Same tag and geometry under another mode
    pub fn with_mode(&self, mode: ConvMode) -> Self {
        Self {
            tag: Arc::clone(&self.tag),
            geometry: self.geometry.clone(),
            mode,
        }
    }
}

impl fmt::Display for RulebookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{} k={:?} s={:?} p={:?} d={:?}]",
            self.tag,
            self.mode,
            self.geometry.kernel_size,
            self.geometry.stride,
            self.geometry.padding,
            self.geometry.dilation
        )
    }
}
