//! Ingestion pipeline backbone: a bounded MPSC channel between the watcher
//! and a single writer task, batching events into per-hour in-memory
//! buffers and flushing on size, time, or hour rollover (§4.2).

pub mod buffer;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use clustertrace_core::{
    config::{PipelineConfig, StorageConfig},
    event::Event,
    time::hour_floor_seconds,
};
use clustertrace_storage::{registry::Registry, writer::BlockWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

pub use buffer::BufferHandle;
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};

/// Handle to the running ingestion pipeline. Dropping the sender side
/// (`Pipeline::sender`) lets the consumer task drain and exit; callers that
/// want an orderly shutdown should use [`Pipeline::shutdown`] instead so the
/// grace period and final seal are honored (§5).
pub struct Pipeline {
    sender: mpsc::Sender<Event>,
    buffer: BufferHandle,
    metrics: Arc<PipelineMetrics>,
    consumer: JoinHandle<()>,
}

impl Pipeline {
    /// Spawns the single writer task and returns a handle to the channel it
    /// drains. `registry` is used to name hour files and to mark which hour
    /// is currently open for writes so the query executor can skip it
    /// (§5).
    pub fn spawn(pipeline_config: PipelineConfig, storage_config: StorageConfig, registry: Arc<Registry>) -> Self {
        let (tx, rx) = mpsc::channel(pipeline_config.buffer_size);
        let buffer = BufferHandle::new();
        let metrics = Arc::new(PipelineMetrics::default());

        let consumer = tokio::spawn(run_writer_loop(
            rx,
            pipeline_config,
            storage_config,
            registry,
            buffer.clone(),
            metrics.clone(),
        ));

        Self {
            sender: tx,
            buffer,
            metrics,
            consumer,
        }
    }

    /// Producers call this to submit an event. Blocks (does not drop) when
    /// the bounded channel is full (the pipeline's backpressure mechanism,
    /// §4.2, §8.1 item 7).
    pub async fn submit(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.sender.send(event).await
    }

    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.sender.clone()
    }

    pub fn buffer_handle(&self) -> BufferHandle {
        self.buffer.clone()
    }

    pub fn metrics(&self) -> PipelineMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Closes the submission side, waits up to `grace` for the writer task
    /// to drain and seal, then returns. Events still in the channel after
    /// `grace` elapses are lost, per the accepted no-WAL trade-off (§4.3,
    /// §5).
    pub async fn shutdown(self, grace: Duration) {
        drop(self.sender);
        match tokio::time::timeout(grace, self.consumer).await {
            Ok(Ok(())) => info!("pipeline writer task drained and sealed cleanly"),
            Ok(Err(e)) => error!(error = %e, "pipeline writer task panicked during shutdown"),
            Err(_) => warn!("pipeline shutdown grace period elapsed before writer task finished draining"),
        }
    }
}

struct OpenFile {
    hour: i64,
    writer: BlockWriter,
}

#[instrument(skip(rx, registry, buffer, metrics))]
async fn run_writer_loop(
    mut rx: mpsc::Receiver<Event>,
    pipeline_config: PipelineConfig,
    storage_config: StorageConfig,
    registry: Arc<Registry>,
    buffer: BufferHandle,
    metrics: Arc<PipelineMetrics>,
) {
    let mut current: Option<OpenFile> = None;
    let flush_interval = Duration::from_secs(storage_config.flush_interval_sec);
    let block_max_bytes = storage_config.block_max_size_bytes();

    loop {
        let tick = tokio::time::sleep(flush_interval.max(Duration::from_millis(100)));
        tokio::select! {
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        handle_event(event, &mut current, &registry, &buffer, &metrics, block_max_bytes).await;
                    }
                    None => {
                        debug!("pipeline channel closed; sealing current file and exiting writer loop");
                        seal_current(&mut current, &registry, &buffer).await;
                        return;
                    }
                }
            }
            _ = tick => {
                if should_flush_on_time(&current, flush_interval) {
                    flush_current(&mut current, &buffer, &metrics).await;
                }
            }
        }
    }
}

fn should_flush_on_time(current: &Option<OpenFile>, flush_interval: Duration) -> bool {
    match current {
        Some(open) => open.writer.age_of_pending().map_or(false, |age| age >= flush_interval),
        None => false,
    }
}

async fn handle_event(
    event: Event,
    current: &mut Option<OpenFile>,
    registry: &Arc<Registry>,
    buffer: &BufferHandle,
    metrics: &Arc<PipelineMetrics>,
    block_max_bytes: u64,
) {
    let natural_hour = hour_floor_seconds(event.timestamp);

    let rollover_needed = match current {
        None => true,
        Some(open) => natural_hour > open.hour,
    };

    if rollover_needed {
        seal_current(current, registry, buffer).await;
        let hour = match current {
            None => natural_hour,
            Some(_) => unreachable!("seal_current always clears `current`"),
        };
        let path = registry.path_for_hour(hour);
        match tokio::task::spawn_blocking(move || BlockWriter::create(path)).await {
            Ok(Ok(writer)) => {
                registry.set_current_writer_hour(Some(hour));
                *current = Some(OpenFile { hour, writer });
            }
            Ok(Err(e)) => {
                error!(error = %e, hour, "failed to open new storage file; event dropped");
                return;
            }
            Err(e) => {
                error!(error = %e, "writer task panicked opening new storage file");
                return;
            }
        }
    }

    if let Some(open) = current {
        buffer.push(event.clone());
        metrics.record_event_ingested();
        open.writer.ingest(event);

        if open.writer.pending_uncompressed_size() >= block_max_bytes {
            flush_current(current, buffer, metrics).await;
        }
    }
}

async fn flush_current(current: &mut Option<OpenFile>, buffer: &BufferHandle, metrics: &Arc<PipelineMetrics>) {
    let Some(open) = current.take() else { return };
    let start = std::time::Instant::now();
    let (hour, result) = tokio::task::spawn_blocking(move || {
        let mut open = open;
        let result = open.writer.flush_block();
        (open.hour, result.map(|()| open))
    })
    .await
    .expect("writer blocking task should not panic");

    match result {
        Ok(open) => {
            buffer.clear();
            metrics.record_block_flushed(start.elapsed().as_millis() as u64);
            *current = Some(open);
        }
        Err(e) => {
            error!(error = %e, hour, "block flush failed; buffered events for this flush are lost");
        }
    }
}

async fn seal_current(current: &mut Option<OpenFile>, registry: &Arc<Registry>, buffer: &BufferHandle) {
    let Some(open) = current.take() else { return };
    let hour = open.hour;
    let result = tokio::task::spawn_blocking(move || open.writer.seal()).await;
    buffer.clear();
    registry.set_current_writer_hour(None);

    match result {
        Ok(Ok(index)) => {
            debug!(hour, blocks = index.blocks.len(), events = index.global_stats.event_count, "sealed storage file");
        }
        Ok(Err(e)) => error!(error = %e, hour, "failed to seal storage file"),
        Err(e) => error!(error = %e, hour, "writer task panicked during seal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustertrace_core::event::{EventType, ResourceMetadata};
    use std::time::Duration as StdDuration;

    fn sample_event(id: &str, ts: i64) -> Event {
        Event::new(
            id,
            ts,
            EventType::Create,
            ResourceMetadata {
                group: String::new(),
                version: "v1".into(),
                kind: "Pod".into(),
                namespace: "default".into(),
                name: "a".into(),
                uid: "uid".into(),
                involved_object_uid: None,
            },
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn submitted_events_are_visible_in_live_buffer_before_flush() {
        let dir = tempfile::tempdir().unwrap();
        let storage_cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            flush_interval_sec: 3600,
            block_max_size_mb: 64,
            ..Default::default()
        };
        let registry = Arc::new(Registry::open(&storage_cfg).unwrap());
        let pipeline = Pipeline::spawn(PipelineConfig::default(), storage_cfg, registry);

        pipeline.submit(sample_event("e1", 10 * 1_000_000_000)).await.unwrap();
        // Give the writer task a beat to process the channel message.
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let snapshot = pipeline.buffer_handle().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "e1");

        pipeline.shutdown(StdDuration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn shutdown_seals_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage_cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            flush_interval_sec: 3600,
            block_max_size_mb: 64,
            ..Default::default()
        };
        let registry = Arc::new(Registry::open(&storage_cfg).unwrap());
        let pipeline = Pipeline::spawn(PipelineConfig::default(), storage_cfg.clone(), registry.clone());

        pipeline.submit(sample_event("e1", 10 * 1_000_000_000)).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        pipeline.shutdown(StdDuration::from_secs(5)).await;

        let files = registry.list_files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(registry.global_stats(&files[0].path).is_ok(), "sealed file should have a parseable footer");
    }
}
