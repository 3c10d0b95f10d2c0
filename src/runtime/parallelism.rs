//! Thread-level parallelism configuration for CPU kernels

/// Default minimum number of items handed to one rayon task.
pub const DEFAULT_MIN_LEN: usize = 64;

/// Controls how CPU kernels split work across threads.
///
/// `num_threads: None` uses rayon's global pool; `Some(n)` builds a dedicated
/// pool with `n` workers. `Some(1)` forces single-threaded execution.
/// `min_len` is the smallest chunk of rows or sites a rayon task processes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParallelismConfig {
    /// Worker thread count, `None` for the global pool
    pub num_threads: Option<usize>,
    /// Minimum items per task, `None` for [`DEFAULT_MIN_LEN`]
    pub min_len: Option<usize>,
}

impl ParallelismConfig {
    /// Create a parallelism configuration
    pub fn new(num_threads: Option<usize>, min_len: Option<usize>) -> Self {
        Self {
            num_threads,
            min_len,
        }
    }

    /// Single-threaded configuration
    pub fn sequential() -> Self {
        Self::new(Some(1), None)
    }

    /// Effective minimum chunk length
    #[inline]
    pub fn min_len(&self) -> usize {
        self.min_len.unwrap_or(DEFAULT_MIN_LEN).max(1)
    }

    /// Returns true if kernels must run on the calling thread only
    #[inline]
    pub fn is_sequential(&self) -> bool {
        self.num_threads == Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_defaults() {
        let cfg = ParallelismConfig::default();
        assert_eq!(cfg.min_len(), DEFAULT_MIN_LEN);
        assert!(!cfg.is_sequential());
        assert!(ParallelismConfig::sequential().is_sequential());
        assert_eq!(ParallelismConfig::new(None, Some(0)).min_len(), 1);
    }
}
