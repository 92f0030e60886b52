use std::fmt;
use std::sync::Arc;

use slicewire_buffer::{BufferPool, PooledBufferPool};

use crate::registry::FactoryRegistry;
use crate::trace::SlicingObserver;

/// Default maximum message size: 1 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Capacity of the first buffer a stream allocates.
pub const DEFAULT_INITIAL_CAPACITY: usize = 1500;

/// Configuration shared by every stream created from one [`StreamContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Capacity of the buffer allocated when a stream is created.
    pub initial_capacity: usize,
    /// Largest message a stream may grow to. Default: 1 MiB.
    pub max_message_size: usize,
    /// Whether unknown object slices are skipped instead of failing.
    pub slice_objects: bool,
    /// Whether skipped slices are traced.
    pub trace_slicing: bool,
    /// Category reported with slicing traces.
    pub slicing_category: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            slice_objects: true,
            trace_slicing: false,
            slicing_category: "Slicing".to_string(),
        }
    }
}

/// The collaborators a stream needs: buffer storage, factories, settings.
///
/// One context is typically created per process and shared by all streams
/// through an `Arc`.
pub struct StreamContext {
    pool: Arc<dyn BufferPool>,
    registry: Arc<FactoryRegistry>,
    config: StreamConfig,
    observer: Option<Arc<dyn SlicingObserver>>,
}

impl StreamContext {
    /// Create a context with a fresh pool, an empty registry and default config.
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    /// Create a context with a fresh pool and registry and explicit config.
    pub fn with_config(config: StreamConfig) -> Self {
        Self::with_parts(
            Arc::new(PooledBufferPool::new()),
            Arc::new(FactoryRegistry::new()),
            config,
        )
    }

    /// Create a context from explicit collaborators.
    pub fn with_parts(
        pool: Arc<dyn BufferPool>,
        registry: Arc<FactoryRegistry>,
        config: StreamConfig,
    ) -> Self {
        Self {
            pool,
            registry,
            config,
            observer: None,
        }
    }

    /// Install an observer notified once per skipped slice.
    pub fn with_slicing_observer(mut self, observer: Arc<dyn SlicingObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn pool(&self) -> &Arc<dyn BufferPool> {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<FactoryRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn slicing_observer(&self) -> Option<&Arc<dyn SlicingObserver>> {
        self.observer.as_ref()
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamContext")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
