//! Block construction and file sealing (§4.3).
//!
//! [`BlockWriter`] performs plain, synchronous file I/O; it is meant to be
//! driven from inside `tokio::task::spawn_blocking` by the single writer
//! task that owns the currently-open file (§5: "removes any need for
//! write-side locking"). Keeping it synchronous also makes it trivial to
//! unit test without a runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use clustertrace_core::{
    block::{BlockMeta, FileIndex, GlobalStats, ResourceLastState},
    error::WriteError,
    event::{Event, EventType, ResourceKey},
};
use tracing::{debug, instrument, warn};

use crate::format;

/// Accumulates events in memory for the block currently being built,
/// tracking the running min/max timestamps and the three summary sets
/// (§3.1, §4.3) without yet compressing or writing anything.
#[derive(Debug, Default)]
struct BlockBuilder {
    events: Vec<Event>,
    timestamp_min: Option<i64>,
    timestamp_max: Option<i64>,
    kind_set: BTreeSet<String>,
    namespace_set: BTreeSet<String>,
    group_set: BTreeSet<String>,
    uncompressed_size: u64,
}

impl BlockBuilder {
    fn push(&mut self, event: &Event) {
        self.timestamp_min = Some(self.timestamp_min.map_or(event.timestamp, |m| m.min(event.timestamp)));
        self.timestamp_max = Some(self.timestamp_max.map_or(event.timestamp, |m| m.max(event.timestamp)));
        self.kind_set.insert(event.resource.kind.clone());
        if !event.resource.namespace.is_empty() {
            self.namespace_set.insert(event.resource.namespace.clone());
        }
        if !event.resource.group.is_empty() {
            self.group_set.insert(event.resource.group.clone());
        }
        // Approximate; the exact uncompressed size is known once serialized
        // at flush time, but this running estimate is enough to decide when
        // to trigger a flush without re-serializing on every ingest.
        self.uncompressed_size += event.data_size + 128;
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A single currently-open storage file (§3.2: "opened when the first event
/// for a given hour is received, grows append-only"). Only one
/// `BlockWriter` should ever exist for a given path at a time (§4.3: "no
/// file opened for hour H is ever reopened for writing").
pub struct BlockWriter {
    path: PathBuf,
    file: File,
    next_offset: u64,
    next_block_id: u64,
    sealed_blocks: Vec<BlockMeta>,
    final_resource_state: BTreeMap<ResourceKey, ResourceLastState>,
    builder: BlockBuilder,
    first_buffered_at: Option<std::time::Instant>,
    compression_level: i32,
}

impl BlockWriter {
    /// Creates a brand-new file for `hour`, writing the fixed header.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn create(path: impl AsRef<Path>) -> Result<Self, WriteError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().create_new(true).write(true).open(&path)?;
        file.write_all(&format::encode_header())?;
        Ok(Self {
            path,
            file,
            next_offset: format::HEADER_LEN as u64,
            next_block_id: 0,
            sealed_blocks: Vec::new(),
            final_resource_state: BTreeMap::new(),
            builder: BlockBuilder::default(),
            first_buffered_at: None,
            compression_level: 3,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_count(&self) -> usize {
        self.sealed_blocks.len()
    }

    pub fn pending_event_count(&self) -> usize {
        self.builder.events.len()
    }

    pub fn pending_uncompressed_size(&self) -> u64 {
        self.builder.uncompressed_size
    }

    pub fn age_of_pending(&self) -> Option<std::time::Duration> {
        self.first_buffered_at.map(|t| t.elapsed())
    }

    /// Adds one event to the in-memory block buffer and updates the
    /// per-file final-state side-index (§3.1, §4.3: "every event updates the
    /// entry for its key"; terminal `DELETE`s are recorded, not removed).
    pub fn ingest(&mut self, event: Event) {
        if self.builder.is_empty() {
            self.first_buffered_at = Some(std::time::Instant::now());
        }
        self.final_resource_state.insert(
            event.key(),
            ResourceLastState {
                uid: event.resource.uid.clone(),
                event_type: event.event_type,
                timestamp: event.timestamp,
                resource_data: event.data.clone(),
            },
        );
        self.builder.push(&event);
        self.builder.events.push(event);
    }

    /// Seals the in-progress block: serializes, compresses, appends to the
    /// file, and records a [`BlockMeta`]. No-op if nothing is buffered.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn flush_block(&mut self) -> Result<(), WriteError> {
        if self.builder.is_empty() {
            return Ok(());
        }
        let builder = std::mem::take(&mut self.builder);
        let serialized = serde_json::to_vec(&builder.events)?;
        let compressed = zstd::stream::encode_all(&serialized[..], self.compression_level)
            .map_err(|e| WriteError::Compress(e.to_string()))?;

        self.file.seek(SeekFrom::Start(self.next_offset))?;
        self.file.write_all(&compressed)?;

        let meta = BlockMeta {
            id: self.next_block_id,
            timestamp_min: builder.timestamp_min.expect("non-empty builder has a min timestamp"),
            timestamp_max: builder.timestamp_max.expect("non-empty builder has a max timestamp"),
            kind_set: builder.kind_set,
            namespace_set: builder.namespace_set,
            group_set: builder.group_set,
            offset: self.next_offset,
            compressed_size: compressed.len() as u64,
            uncompressed_size: serialized.len() as u64,
            event_count: builder.events.len() as u64,
        };
        debug!(block_id = meta.id, events = meta.event_count, compressed = meta.compressed_size, "sealed block");

        self.next_offset += compressed.len() as u64;
        self.next_block_id += 1;
        self.first_buffered_at = None;
        self.sealed_blocks.push(meta);
        Ok(())
    }

    /// Seals the file: flushes any remaining buffered events into a final
    /// block, writes the footer and trailer, and fsyncs (§4.3). Consumes
    /// `self`. A sealed file is never written to again.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn seal(mut self) -> Result<FileIndex, WriteError> {
        self.flush_block()?;

        let global_stats = GlobalStats::from_blocks(&self.sealed_blocks).unwrap_or(GlobalStats {
            timestamp_min: 0,
            timestamp_max: 0,
            event_count: 0,
        });
        let index = FileIndex {
            blocks: self.sealed_blocks,
            global_stats,
            final_resource_state: self.final_resource_state,
        };

        let footer_bytes = serde_json::to_vec(&index)?;
        self.file.seek(SeekFrom::Start(self.next_offset))?;
        self.file.write_all(&footer_bytes)?;
        self.file.write_all(&format::encode_trailer(footer_bytes.len() as u64))?;
        self.file.sync_all()?;

        Ok(index)
    }

    /// Aborts the file without writing a footer; used when shutdown occurs
    /// with unflushed events still buffered beyond the grace period (§5).
    /// The file remains on disk, incomplete, to be skipped (not deleted) by
    /// future queries (§4.3).
    pub fn abandon(self) {
        warn!(path = %self.path.display(), events_lost = self.builder.events.len(), "abandoning open file without sealing; events lost per no-WAL trade-off");
    }
}
