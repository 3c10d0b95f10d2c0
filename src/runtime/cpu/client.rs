//! CPU client: configuration carrier and operation dispatch target

use crate::runtime::ParallelismConfig;
use crate::sparse::GridPolicy;
#[cfg(feature = "rayon")]
use std::sync::Arc;

/// CPU client for sparse operation dispatch
///
/// The client is cheap to clone; a dedicated rayon pool, when configured,
/// is shared between clones.
#[derive(Clone, Debug, Default)]
pub struct CpuClient {
    parallelism: ParallelismConfig,
    grid_policy: GridPolicy,
    #[cfg(feature = "rayon")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl CpuClient {
    /// Create a client with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the parallelism configuration
    ///
    /// A dedicated thread pool is built when `num_threads` is greater than one.
    /// If the pool cannot be created the client falls back to the global pool.
    pub fn with_parallelism(mut self, config: ParallelismConfig) -> Self {
        self.parallelism = config;
        #[cfg(feature = "rayon")]
        {
            self.pool = match config.num_threads {
                Some(n) if n > 1 => {
                    match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                        Ok(pool) => Some(Arc::new(pool)),
                        Err(err) => {
                            tracing::warn!(threads = n, error = %err, "falling back to global rayon pool");
                            None
                        }
                    }
                }
                _ => None,
            };
        }
        self
    }

    /// Replace the hash-grid backing policy used by rulebook builds
    pub fn with_grid_policy(mut self, policy: GridPolicy) -> Self {
        self.grid_policy = policy;
        self
    }

    /// Current parallelism configuration
    pub fn parallelism(&self) -> ParallelismConfig {
        self.parallelism
    }

    /// Current hash-grid policy
    pub fn grid_policy(&self) -> GridPolicy {
        self.grid_policy
    }

    /// Minimum items per rayon task
    #[inline]
    pub fn rayon_min_len(&self) -> usize {
        self.parallelism.min_len()
    }

    /// Returns true if kernels should stay on the calling thread
    #[inline]
    pub fn is_sequential(&self) -> bool {
        !cfg!(feature = "rayon") || self.parallelism.is_sequential()
    }

    /// Run `f` inside the configured thread pool
    pub fn install_parallelism<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        #[cfg(feature = "rayon")]
        {
            if let Some(pool) = &self.pool {
                return pool.install(f);
            }
        }
        f()
    }
}
