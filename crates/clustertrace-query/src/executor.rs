//! Plans and executes range+predicate queries across storage files and the
//! in-memory buffer, merging true events with synthetic state-snapshot
//! events (§4.5).

use std::sync::Arc;
use std::time::Instant;

use clustertrace_core::error::{QueryError, ValidationError};
use clustertrace_core::event::{Event, EventType, ResourceKey, ResourceMetadata};
use clustertrace_pipeline::BufferHandle;
use clustertrace_storage::cache::BlockCache;
use clustertrace_storage::reader::BlockReader;
use clustertrace_storage::registry::Registry;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::filter::{block_matches_filters, matches_filters, Filters};

/// Input to [`QueryExecutor::execute`] (§4.5).
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub start_sec: i64,
    pub end_sec: i64,
    pub filters: Filters,
}

impl QueryRequest {
    fn validate(&self) -> Result<(i64, i64), ValidationError> {
        if self.start_sec < 0 {
            return Err(ValidationError::NegativeTimestamp { start: self.start_sec, end: self.end_sec });
        }
        if self.end_sec < 0 {
            return Err(ValidationError::NegativeTimestamp { start: self.start_sec, end: self.end_sec });
        }
        if self.start_sec > self.end_sec {
            return Err(ValidationError::StartAfterEnd { start: self.start_sec, end: self.end_sec });
        }
        if !clustertrace_core::validation::is_valid_namespace_filter(&self.filters.namespace) {
            return Err(ValidationError::InvalidNamespace(self.filters.namespace.clone()));
        }
        Ok((
            self.start_sec * clustertrace_core::time::NANOS_PER_SEC,
            self.end_sec * clustertrace_core::time::NANOS_PER_SEC,
        ))
    }
}

/// Bookkeeping counters returned alongside a query's events (§4.5 step 7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCounters {
    pub files_searched: u64,
    pub blocks_scanned: u64,
    pub blocks_skipped: u64,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub events: Vec<Event>,
    pub counters: QueryCounters,
    pub execution_time_ms: u64,
}

/// Executes [`QueryRequest`]s against the storage [`Registry`]/cache and the
/// pipeline's live buffer (§4.5).
pub struct QueryExecutor {
    registry: Arc<Registry>,
    cache: Arc<BlockCache>,
    buffer: BufferHandle,
}

impl QueryExecutor {
    pub fn new(registry: Arc<Registry>, cache: Arc<BlockCache>, buffer: BufferHandle) -> Self {
        Self { registry, cache, buffer }
    }

    /// Runs the full seven-step algorithm (§4.5). `cancel` is checked
    /// between files and between blocks so a caller can abandon a
    /// long-running scan without waiting for it to finish (§5).
    #[instrument(skip(self, cancel), fields(start = request.start_sec, end = request.end_sec))]
    pub async fn execute(&self, request: QueryRequest, cancel: &CancellationToken) -> Result<QueryResult, QueryError> {
        let started = Instant::now();
        let (start_ns, end_ns) = request.validate()?;
        let filters = request.filters.clone();

        let candidates = self
            .registry
            .candidate_files(start_ns, end_ns)
            .map_err(|e| QueryError::Internal(e.to_string()))?;

        let mut counters = QueryCounters::default();
        let mut resources_with_events: HashSet<ResourceKey> = HashSet::new();
        let mut matched_events: Vec<Event> = Vec::new();
        let mut snapshot_candidates: Vec<(ResourceKey, clustertrace_core::block::ResourceLastState)> = Vec::new();

        for file in &candidates {
            if cancel.is_cancelled() {
                break;
            }
            counters.files_searched += 1;

            let (mut reader, index) = match BlockReader::open(&file.path) {
                Ok(opened) => opened,
                Err(e) if e.is_incomplete_file() => {
                    debug!(path = %file.path.display(), "skipping incomplete file");
                    continue;
                }
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "skipping file after backend error");
                    continue;
                }
            };

            for (key, state) in &index.final_resource_state {
                snapshot_candidates.push((key.clone(), state.clone()));
            }

            for block in &index.blocks {
                if cancel.is_cancelled() {
                    break;
                }

                if block.timestamp_max < start_ns || block.timestamp_min > end_ns {
                    counters.blocks_skipped += 1;
                    continue;
                }
                if !filters.is_empty() && !block_matches_filters(block, &filters) {
                    counters.blocks_skipped += 1;
                    continue;
                }

                counters.blocks_scanned += 1;
                let events = match reader.read_block_with_cache(block, &self.cache) {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(path = %file.path.display(), block_id = block.id, error = %e, "failed to materialize block");
                        continue;
                    }
                };

                for event in events.iter() {
                    // Step 3: record key as "has a real event" even when the
                    // event itself is filtered out below, so step 5 never
                    // double-counts this resource via a synthetic snapshot.
                    resources_with_events.insert(event.key());

                    if event.timestamp < start_ns || event.timestamp > end_ns {
                        continue;
                    }
                    if !matches_filters(&event.resource, &filters) {
                        continue;
                    }
                    matched_events.push(event.clone());
                }
            }
        }

        // Step 5: state-snapshot synthesis, now that every candidate file's
        // real events have been accounted for in `resources_with_events`.
        for (key, state) in snapshot_candidates {
            if resources_with_events.contains(&key) {
                continue;
            }
            if state.event_type == EventType::Delete {
                continue;
            }
            if state.timestamp > end_ns {
                continue;
            }
            if let Some((group, version, kind, namespace, name)) = key.split() {
                let resource = ResourceMetadata {
                    group: group.to_string(),
                    version: version.to_string(),
                    kind: kind.to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    uid: state.uid.clone(),
                    involved_object_uid: None,
                };
                if !matches_filters(&resource, &filters) {
                    continue;
                }
                let id = format!("state-{key}-{}", state.timestamp);
                matched_events.push(Event::new(id, state.timestamp, state.event_type, resource, state.resource_data.clone()));
            }
        }

        // Step 6: merge the live, unflushed buffer under the same predicate.
        for event in self.buffer.snapshot() {
            if event.timestamp < start_ns || event.timestamp > end_ns {
                continue;
            }
            if !matches_filters(&event.resource, &filters) {
                continue;
            }
            matched_events.push(event);
        }

        // Step 7: stable sort by timestamp; ties keep arrival order.
        matched_events.sort_by_key(|e| e.timestamp);

        Ok(QueryResult {
            events: matched_events,
            counters,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// `QueryCount(QueryRequest) -> int64` (§6.4): same plan and merge as
    /// [`Self::execute`], reporting only the final count. There is no
    /// cheaper path that skips materializing events; the state-snapshot
    /// merge and live-buffer dedup both depend on having the full matched
    /// set in hand before a count is meaningful.
    pub async fn query_count(&self, request: QueryRequest, cancel: &CancellationToken) -> Result<i64, QueryError> {
        let result = self.execute(request, cancel).await?;
        Ok(result.events.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustertrace_core::config::StorageConfig;
    use clustertrace_core::event::EventType;
    use clustertrace_storage::writer::BlockWriter;

    fn sample_event(id: &str, ts: i64, kind: &str, name: &str, event_type: EventType) -> Event {
        Event::new(
            id,
            ts,
            event_type,
            ResourceMetadata {
                group: String::new(),
                version: "v1".into(),
                kind: kind.into(),
                namespace: "default".into(),
                name: name.into(),
                uid: format!("uid-{name}"),
                involved_object_uid: None,
            },
            serde_json::json!({"n": name}),
        )
    }

    #[tokio::test]
    async fn query_count_matches_execute_event_count() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let registry = Arc::new(Registry::open(&cfg).unwrap());

        let mut w = BlockWriter::create(registry.path_for_hour(0)).unwrap();
        w.ingest(sample_event("e1", 10, "Pod", "a", EventType::Create));
        w.ingest(sample_event("e2", 20, "Pod", "b", EventType::Create));
        w.seal().unwrap();

        let cache = Arc::new(BlockCache::new(16));
        let executor = QueryExecutor::new(registry, cache, BufferHandle::new());
        let request = QueryRequest {
            start_sec: 0,
            end_sec: 3600,
            filters: Filters::default(),
        };

        let count = executor.query_count(request.clone(), &CancellationToken::new()).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn real_event_wins_over_synthetic_snapshot_for_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let registry = Arc::new(Registry::open(&cfg).unwrap());

        let hour = 0i64;
        let mut w = BlockWriter::create(registry.path_for_hour(hour)).unwrap();
        w.ingest(sample_event("e1", 10, "Pod", "a", EventType::Create));
        w.ingest(sample_event("e2", 20, "Pod", "a", EventType::Update));
        w.seal().unwrap();

        let cache = Arc::new(BlockCache::new(16));
        let executor = QueryExecutor::new(registry, cache, BufferHandle::new());

        let result = executor
            .execute(
                QueryRequest {
                    start_sec: 0,
                    end_sec: 3600,
                    filters: Filters::default(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // Only the two real events, no synthetic snapshot duplicate.
        assert_eq!(result.events.len(), 2);
        assert!(result.events.iter().all(|e| !e.id.starts_with("state-")));
    }

    #[tokio::test]
    async fn deleted_resource_never_emits_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let registry = Arc::new(Registry::open(&cfg).unwrap());

        let prev_hour = 0i64;
        let mut w = BlockWriter::create(registry.path_for_hour(prev_hour)).unwrap();
        w.ingest(sample_event("e1", 10, "Pod", "a", EventType::Create));
        w.ingest(sample_event("e2", 20, "Pod", "a", EventType::Delete));
        w.seal().unwrap();

        let this_hour = 3600i64;
        let w2 = BlockWriter::create(registry.path_for_hour(this_hour)).unwrap();
        w2.seal().unwrap();

        let cache = Arc::new(BlockCache::new(16));
        let executor = QueryExecutor::new(registry, cache, BufferHandle::new());

        let result = executor
            .execute(
                QueryRequest {
                    start_sec: 3600,
                    end_sec: 7200,
                    filters: Filters::default(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.events.is_empty(), "terminal DELETE state must not resurrect as a snapshot");
    }

    #[tokio::test]
    async fn live_resource_from_a_preceding_file_appears_as_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let registry = Arc::new(Registry::open(&cfg).unwrap());

        let prev_hour = 0i64;
        let mut w = BlockWriter::create(registry.path_for_hour(prev_hour)).unwrap();
        w.ingest(sample_event("e1", 10, "Pod", "a", EventType::Create));
        w.seal().unwrap();

        let this_hour = 3600i64;
        let w2 = BlockWriter::create(registry.path_for_hour(this_hour)).unwrap();
        w2.seal().unwrap();

        let cache = Arc::new(BlockCache::new(16));
        let executor = QueryExecutor::new(registry, cache, BufferHandle::new());

        let result = executor
            .execute(
                QueryRequest {
                    start_sec: 3600,
                    end_sec: 7200,
                    filters: Filters::default(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.events.len(), 1);
        assert!(result.events[0].id.starts_with("state-"));
        assert_eq!(result.events[0].resource.name, "a");
    }

    #[tokio::test]
    async fn negative_timestamp_is_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let registry = Arc::new(Registry::open(&cfg).unwrap());
        let cache = Arc::new(BlockCache::new(16));
        let executor = QueryExecutor::new(registry, cache, BufferHandle::new());

        let err = executor
            .execute(
                QueryRequest {
                    start_sec: -1,
                    end_sec: 10,
                    filters: Filters::default(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::InvalidRequest(ValidationError::NegativeTimestamp { .. })));
    }

    #[tokio::test]
    async fn malformed_namespace_filter_is_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let registry = Arc::new(Registry::open(&cfg).unwrap());
        let cache = Arc::new(BlockCache::new(16));
        let executor = QueryExecutor::new(registry, cache, BufferHandle::new());

        let err = executor
            .execute(
                QueryRequest {
                    start_sec: 0,
                    end_sec: 10,
                    filters: Filters {
                        namespace: "-not-a-valid-namespace-".into(),
                        ..Filters::default()
                    },
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::InvalidRequest(ValidationError::InvalidNamespace(_))));
    }
}
