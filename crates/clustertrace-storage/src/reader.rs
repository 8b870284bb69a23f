//! Opens a sealed storage file, parses its footer, and materializes blocks
//! on demand (§4.4).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clustertrace_core::{block::BlockMeta, event::Event};
use thiserror::Error;
use tracing::instrument;

use crate::cache::BlockCache;
use crate::format;

/// Distinguishable failure kinds (§4.4, §7 REDESIGN). `is_incomplete_file`
/// and `is_invalid_format` replace the substring matching the distilled
/// spec calls out as a weakness.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file too small to contain a trailer: {path}")]
    TrailerMissing { path: PathBuf },

    #[error("invalid file header magic bytes: {path}")]
    MagicMismatch { path: PathBuf },

    #[error("footer length {declared} bytes points outside file bounds ({file_len} bytes): {path}")]
    FooterLengthOutOfRange { path: PathBuf, declared: u64, file_len: u64 },

    #[error("footer truncated or unparseable: {path}: {source}")]
    TruncatedFooter { path: PathBuf, source: serde_json::Error },

    #[error("block decompression failed: {0}")]
    Decompress(String),

    #[error("block payload failed to deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl ReaderError {
    /// `true` for file states the executor skips silently at debug level;
    /// the currently-open file, or a crashed write (§4.5, §7).
    pub fn is_incomplete_file(&self) -> bool {
        matches!(
            self,
            ReaderError::TrailerMissing { .. } | ReaderError::FooterLengthOutOfRange { .. } | ReaderError::TruncatedFooter { .. }
        )
    }

    /// `true` when the file simply isn't one of ours; skipped with a
    /// warning, not a debug line, since it indicates foreign data in the
    /// storage directory rather than an in-progress write (§7).
    pub fn is_invalid_format(&self) -> bool {
        matches!(self, ReaderError::MagicMismatch { .. })
    }
}

/// A reader bound to one sealed file, with its footer already parsed.
pub struct BlockReader {
    path: Arc<Path>,
    file: File,
}

impl BlockReader {
    /// Reads the trailer, seeks to the footer, and parses the block index
    /// and final-state map (§4.4). Fails with a distinguishable error for
    /// trailer-missing, magic-mismatch, length-out-of-range, and
    /// truncated-footer cases.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, clustertrace_core::block::FileIndex), ReaderError> {
        let path_buf = path.as_ref().to_path_buf();
        let mut file = File::open(&path_buf)?;
        let file_len = file.metadata()?.len();

        if file_len < (format::HEADER_LEN + format::TRAILER_LEN) as u64 {
            return Err(ReaderError::TrailerMissing { path: path_buf });
        }

        let mut header = [0u8; format::HEADER_LEN];
        file.read_exact(&mut header)?;
        if header != format::MAGIC {
            return Err(ReaderError::MagicMismatch { path: path_buf });
        }

        file.seek(SeekFrom::End(-(format::TRAILER_LEN as i64)))?;
        let mut trailer = [0u8; format::TRAILER_LEN];
        file.read_exact(&mut trailer)?;

        // The header already matched our magic, so a trailer that fails to
        // decode means a truncated/corrupted write, not a foreign file.
        let footer_len = format::decode_trailer(&trailer).ok_or_else(|| ReaderError::TrailerMissing { path: path_buf.clone() })?;

        let trailer_start = file_len - format::TRAILER_LEN as u64;
        let footer_start = trailer_start.checked_sub(footer_len).filter(|&s| s >= format::HEADER_LEN as u64);
        let footer_start = match footer_start {
            Some(s) => s,
            None => {
                return Err(ReaderError::FooterLengthOutOfRange {
                    path: path_buf,
                    declared: footer_len,
                    file_len,
                })
            }
        };

        file.seek(SeekFrom::Start(footer_start))?;
        let mut footer_bytes = vec![0u8; footer_len as usize];
        file.read_exact(&mut footer_bytes)?;

        let index: clustertrace_core::block::FileIndex =
            serde_json::from_slice(&footer_bytes).map_err(|source| ReaderError::TruncatedFooter { path: path_buf.clone(), source })?;

        Ok((
            Self {
                path: Arc::from(path_buf.as_path()),
                file,
            },
            index,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seeks, reads `compressed_size` bytes, decompresses, and
    /// deserializes. Performs no filtering; callers apply predicates
    /// themselves (§4.4, §4.6).
    #[instrument(skip(self, meta), fields(path = %self.path.display(), block_id = meta.id))]
    pub fn read_block_events(&mut self, meta: &BlockMeta) -> Result<Vec<Event>, ReaderError> {
        self.file.seek(SeekFrom::Start(meta.offset))?;
        let mut compressed = vec![0u8; meta.compressed_size as usize];
        self.file.read_exact(&mut compressed)?;

        let decompressed = zstd::stream::decode_all(&compressed[..]).map_err(|e| ReaderError::Decompress(e.to_string()))?;
        let events: Vec<Event> = serde_json::from_slice(&decompressed)?;
        Ok(events)
    }

    /// Same as [`Self::read_block_events`], but consults the shared LRU
    /// first; a hit returns decoded events without any I/O (§4.4, §4.7).
    pub fn read_block_with_cache(&mut self, meta: &BlockMeta, cache: &BlockCache) -> Result<Arc<Vec<Event>>, ReaderError> {
        if let Some(hit) = cache.get(&self.path, meta.id) {
            return Ok(hit);
        }
        let events = Arc::new(self.read_block_events(meta)?);
        cache.insert(self.path.clone(), meta.id, events.clone());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BlockWriter;
    use clustertrace_core::event::{EventType, ResourceMetadata};
    use tempfile::tempdir;

    fn sample_event(id: &str, ts: i64) -> clustertrace_core::event::Event {
        clustertrace_core::event::Event::new(
            id,
            ts,
            EventType::Create,
            ResourceMetadata {
                group: String::new(),
                version: "v1".into(),
                kind: "Pod".into(),
                namespace: "default".into(),
                name: "a".into(),
                uid: "uid-a".into(),
                involved_object_uid: None,
            },
            serde_json::json!({}),
        )
    }

    #[test]
    fn round_trip_write_then_read_returns_same_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f1");
        let mut writer = BlockWriter::create(&path).unwrap();
        writer.ingest(sample_event("e1", 1));
        writer.ingest(sample_event("e2", 2));
        writer.seal().unwrap();

        let (mut reader, index) = BlockReader::open(&path).unwrap();
        assert_eq!(index.blocks.len(), 1);
        let events = reader.read_block_events(&index.blocks[0]).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "e1");
        assert_eq!(events[1].id, "e2");
    }

    #[test]
    fn file_too_small_for_trailer_is_reported_as_incomplete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f2");
        // Currently-open (never-sealed) files are exactly this shape: a
        // header and some block bytes, no footer/trailer yet.
        let writer = BlockWriter::create(&path).unwrap();
        drop(writer);

        let err = BlockReader::open(&path).unwrap_err();
        assert!(err.is_incomplete_file(), "expected incomplete-file classification, got {err:?}");
    }

    #[test]
    fn footer_shorter_than_declared_length_is_reported_as_incomplete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f2b");
        let mut writer = BlockWriter::create(&path).unwrap();
        writer.ingest(sample_event("e1", 1));
        writer.seal().unwrap();

        // Corrupt the footer body in place (same length) so the trailer's
        // declared length and magic still check out, but the JSON inside no
        // longer parses as a `FileIndex`.
        let mut bytes = std::fs::read(&path).unwrap();
        let mut trailer = [0u8; format::TRAILER_LEN];
        trailer.copy_from_slice(&bytes[bytes.len() - format::TRAILER_LEN..]);
        let footer_len = format::decode_trailer(&trailer).unwrap();
        let footer_start = bytes.len() - format::TRAILER_LEN - footer_len as usize;
        for b in bytes.iter_mut().skip(footer_start + 1).take(4) {
            *b = b'!';
        }
        std::fs::write(&path, bytes).unwrap();

        let err = BlockReader::open(&path).unwrap_err();
        assert!(err.is_incomplete_file(), "expected incomplete-file classification, got {err:?}");
    }

    #[test]
    fn foreign_file_is_reported_as_invalid_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f3");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let err = BlockReader::open(&path).unwrap_err();
        assert!(err.is_invalid_format(), "expected invalid-format classification, got {err:?}");
    }

    #[test]
    fn cache_hit_avoids_reparsing_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f4");
        let mut writer = BlockWriter::create(&path).unwrap();
        writer.ingest(sample_event("e1", 1));
        writer.seal().unwrap();

        let (mut reader, index) = BlockReader::open(&path).unwrap();
        let cache = BlockCache::new(16);
        let first = reader.read_block_with_cache(&index.blocks[0], &cache).unwrap();
        let second = reader.read_block_with_cache(&index.blocks[0], &cache).unwrap();
        assert!(Arc::ptr_eq(&first, &second), "second read should be served from cache");
    }
}
