//! `clustertrace` ties together the ingestion-and-storage engine: the
//! [`clustertrace_watcher`] producer, the [`clustertrace_pipeline`] backbone,
//! the [`clustertrace_storage`] block engine, and the [`clustertrace_query`]
//! read path.
//!
//! This crate is a thin facade, mirroring how a host process (HTTP/gRPC API,
//! config loader, lifecycle orchestration; all explicitly out of scope here)
//! would wire the pieces together. It owns no behavior of its own beyond
//! construction and re-exports.

pub use clustertrace_core::{
    config::{EngineConfig, WatchedKind},
    error::{QueryError, ValidationError, WriteError},
    event::{Event, EventType, ResourceKey, ResourceMetadata},
};
pub use clustertrace_pipeline::Pipeline;
pub use clustertrace_query::{
    executor::{QueryExecutor, QueryRequest, QueryResult},
    filter::Filters,
};
pub use clustertrace_storage::{
    cache::BlockCache,
    reader::{BlockReader, ReaderError},
    registry::Registry,
    writer::BlockWriter,
};
pub use clustertrace_watcher::ResourceWatcher;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

/// Constructs the engine's components from a loaded [`EngineConfig`], ready
/// for a host process to spawn the watcher, drive the pipeline, and expose
/// the query executor to its own API surface.
pub struct Engine {
    pub pipeline: Pipeline,
    pub registry: Arc<Registry>,
    pub cache: Arc<BlockCache>,
    pub executor: QueryExecutor,
    shutdown_grace: Duration,
}

impl Engine {
    /// Builds the storage-facing half of the engine (registry, cache,
    /// executor, pipeline). Does not start the watcher; callers drive that
    /// separately via [`Engine::start_watcher`] since its lifecycle (a live
    /// `kube::Client`, reload signals) is owned by the host process.
    pub fn new(config: EngineConfig) -> Result<Self, clustertrace_core::error::EngineInitError> {
        info!(directory = %config.storage.directory.display(), "initializing clustertrace engine");
        let registry = Arc::new(Registry::open(&config.storage)?);
        let cache = Arc::new(BlockCache::new(config.storage.cache_max_mb));
        let pipeline = Pipeline::spawn(config.pipeline, config.storage.clone(), registry.clone());
        let executor = QueryExecutor::new(registry.clone(), cache.clone(), pipeline.buffer_handle());

        Ok(Self {
            pipeline,
            registry,
            cache,
            executor,
            shutdown_grace: Duration::from_secs(config.pipeline.shutdown_grace_sec),
        })
    }

    /// Starts one watch subscription per entry in `kinds`, feeding events
    /// into this engine's pipeline. The returned [`ResourceWatcher`] is the
    /// caller's handle for later reload/shutdown.
    pub fn start_watcher(&self, client: kube::Client, kinds: &[WatchedKind]) -> ResourceWatcher {
        let mut watcher = ResourceWatcher::new(client, self.pipeline.sender());
        watcher.reconcile(kinds);
        watcher
    }

    /// Drains and seals the pipeline's current file, bounded by the
    /// configured grace period (§5).
    pub async fn shutdown(self) {
        self.pipeline.shutdown(self.shutdown_grace).await;
    }
}
