//! Plain-atomic counters the pipeline exposes for the external telemetry
//! collaborator to read (§4.2: "exposes counters for queue depth, events
//! ingested, blocks written, flush latency"). This crate does not export
//! Prometheus/metrics-rs itself; publishing is the API layer's job.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    events_ingested: AtomicU64,
    blocks_written: AtomicU64,
    flushes: AtomicU64,
    last_flush_latency_ms: AtomicU64,
}

impl PipelineMetrics {
    pub(crate) fn record_event_ingested(&self) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block_flushed(&self, latency_ms: u64) {
        self.blocks_written.fetch_add(1, Ordering::Relaxed);
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.last_flush_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            last_flush_latency_ms: self.last_flush_latency_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    pub events_ingested: u64,
    pub blocks_written: u64,
    pub flushes: u64,
    pub last_flush_latency_ms: u64,
}
