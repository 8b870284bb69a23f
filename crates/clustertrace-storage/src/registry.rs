//! Enumerates on-disk storage files, extracts hour-of-file from names, and
//! tracks the currently-open file for writes (§4.8 component table, §6.1).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use clustertrace_core::{
    block::GlobalStats,
    config::StorageConfig,
    error::EngineInitError,
    time::{hour_range_ns, SECONDS_PER_HOUR},
};
use tracing::{debug, warn};

use crate::reader::{BlockReader, ReaderError};

const FILE_SUFFIX: &str = ".ctf";

/// One hour's worth of events on disk, as seen by the registry before its
/// footer has necessarily been parsed (§3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFile {
    pub hour_start_sec: i64,
    pub path: PathBuf,
}

impl StorageFile {
    pub fn hour_range_ns(&self) -> (i64, i64) {
        hour_range_ns(self.hour_start_sec)
    }
}

/// Cheap, always-resident summary of a sealed file's footer stats, cached
/// after the first parse so repeated candidate-selection passes don't
/// re-read the footer (§9 recovered feature #1).
#[derive(Debug, Clone, Copy)]
struct CachedStats {
    global: GlobalStats,
}

/// Filename encodes the file's hour as integer seconds truncated to 3600
/// (§3.1, §6.1): `<hour_start_sec>.ctf`.
pub fn filename_for_hour(hour_start_sec: i64) -> String {
    format!("{hour_start_sec}{FILE_SUFFIX}")
}

/// Parses a filename back to its integer hour, per §6.1's requirement that
/// "the exact textual form is an implementation choice but must be
/// parseable back to the integer by the registry".
pub fn hour_from_filename(file_name: &str) -> Option<i64> {
    let stem = file_name.strip_suffix(FILE_SUFFIX)?;
    stem.parse::<i64>().ok().filter(|h| h % SECONDS_PER_HOUR == 0)
}

pub struct Registry {
    directory: PathBuf,
    stats_cache: RwLock<HashMap<PathBuf, CachedStats>>,
    current_writer_hour: RwLock<Option<i64>>,
}

impl Registry {
    /// Creates the storage directory if missing and returns a registry
    /// bound to it. Does not eagerly parse any footers.
    pub fn open(config: &StorageConfig) -> Result<Self, EngineInitError> {
        fs::create_dir_all(&config.directory).map_err(|source| EngineInitError::StorageDirectory {
            path: config.directory.clone(),
            source,
        })?;
        Ok(Self {
            directory: config.directory.clone(),
            stats_cache: RwLock::new(HashMap::new()),
            current_writer_hour: RwLock::new(None),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for_hour(&self, hour_start_sec: i64) -> PathBuf {
        self.directory.join(filename_for_hour(hour_start_sec))
    }

    /// Enumerates every recognizable storage file in the directory, sorted
    /// by hour ascending. Files whose name doesn't parse as an hour are
    /// silently ignored; they are not ours (§6.1).
    pub fn list_files(&self) -> Result<Vec<StorageFile>, EngineInitError> {
        let entries = fs::read_dir(&self.directory).map_err(|source| EngineInitError::Enumeration {
            path: self.directory.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| EngineInitError::Enumeration {
                path: self.directory.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(hour) = hour_from_filename(name) {
                files.push(StorageFile {
                    hour_start_sec: hour,
                    path: entry.path(),
                });
            }
        }
        files.sort_by_key(|f| f.hour_start_sec);
        Ok(files)
    }

    /// Records which hour the writer currently owns, so candidate selection
    /// can treat it as not-yet-sealed without attempting to open it for
    /// reading (§5: "the currently-open file has a single writer and no
    /// concurrent readers").
    pub fn set_current_writer_hour(&self, hour_start_sec: Option<i64>) {
        *self.current_writer_hour.write().unwrap() = hour_start_sec;
    }

    pub fn current_writer_hour(&self) -> Option<i64> {
        *self.current_writer_hour.read().unwrap()
    }

    /// Opens `path`'s footer (if not already cached) and returns its global
    /// stats. Returns `Err` for incomplete/invalid files, which callers are
    /// expected to absorb per §7.
    pub fn global_stats(&self, path: &Path) -> Result<GlobalStats, ReaderError> {
        if let Some(cached) = self.stats_cache.read().unwrap().get(path) {
            return Ok(cached.global);
        }
        let (_, index) = BlockReader::open(path)?;
        let global = index.global_stats;
        self.stats_cache.write().unwrap().insert(path.to_path_buf(), CachedStats { global });
        Ok(global)
    }

    /// Step 1 of the query algorithm (§4.5): files whose hour range
    /// overlaps `[start_ns, end_ns]`, plus files whose *event* timestamps
    /// overlap despite a non-overlapping hour range (late arrivals, §9),
    /// plus the single most-recent file entirely before `start_ns` (for
    /// state snapshots). The currently-open (unsealed) hour is excluded;
    /// its data lives only in the in-memory buffer.
    pub fn candidate_files(&self, start_ns: i64, end_ns: i64) -> Result<Vec<StorageFile>, EngineInitError> {
        let all = self.list_files()?;
        let writer_hour = self.current_writer_hour();

        let mut overlapping = Vec::new();
        let mut preceding: Option<StorageFile> = None;

        for file in all {
            if Some(file.hour_start_sec) == writer_hour {
                continue;
            }
            let (hour_start, hour_end) = file.hour_range_ns();
            let hour_overlaps = hour_start <= end_ns && hour_end > start_ns;

            if hour_overlaps {
                overlapping.push(file);
                continue;
            }

            if hour_end <= start_ns {
                // Candidate for "most recent file entirely before start".
                let is_more_recent = preceding.as_ref().map_or(true, |p| file.hour_start_sec > p.hour_start_sec);
                if is_more_recent {
                    preceding = Some(file.clone());
                }
                continue;
            }

            // Late-arriving events: hour range doesn't overlap, but the
            // file's actual event timestamps might (§4.5 step 1, §8.2 S6).
            match self.global_stats(&file.path) {
                Ok(stats) => {
                    if stats.timestamp_min <= end_ns && stats.timestamp_max >= start_ns {
                        overlapping.push(file);
                    }
                }
                Err(e) if e.is_incomplete_file() => {
                    debug!(path = %file.path.display(), "skipping incomplete file during candidate selection");
                }
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "failed to read footer during candidate selection");
                }
            }
        }

        if let Some(p) = preceding {
            if !overlapping.iter().any(|f| f.hour_start_sec == p.hour_start_sec) {
                overlapping.push(p);
            }
        }

        overlapping.sort_by_key(|f| f.hour_start_sec);
        Ok(overlapping)
    }

    /// Read-only enumeration of files whose footer failed to parse as
    /// complete; operator tooling outside this crate's scope can use this
    /// to decide what to retire. Never deletes anything (§4.3, §9 recovered
    /// feature #2).
    pub fn incomplete_files(&self) -> Result<Vec<StorageFile>, EngineInitError> {
        let all = self.list_files()?;
        Ok(all
            .into_iter()
            .filter(|f| match BlockReader::open(&f.path) {
                Ok(_) => false,
                Err(e) => e.is_incomplete_file(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_round_trips_hour() {
        let name = filename_for_hour(1_599_998_400);
        assert_eq!(hour_from_filename(&name), Some(1_599_998_400));
    }

    #[test]
    fn non_hour_aligned_or_foreign_names_are_rejected() {
        assert_eq!(hour_from_filename("not-a-number.ctf"), None);
        assert_eq!(hour_from_filename("1599998401.ctf"), None); // not hour-aligned
        assert_eq!(hour_from_filename("1599998400.txt"), None);
    }

    #[test]
    fn list_files_ignores_foreign_entries_and_sorts_by_hour() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(filename_for_hour(7200)), b"").unwrap();
        std::fs::write(dir.path().join(filename_for_hour(0)), b"").unwrap();
        std::fs::write(dir.path().join("README.md"), b"").unwrap();

        let cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let registry = Registry::open(&cfg).unwrap();
        let files = registry.list_files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].hour_start_sec, 0);
        assert_eq!(files[1].hour_start_sec, 7200);
    }

    #[test]
    fn candidate_files_includes_most_recent_preceding_file() {
        use crate::writer::BlockWriter;
        use clustertrace_core::event::{Event, EventType, ResourceMetadata};

        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        let registry = Registry::open(&cfg).unwrap();

        // Hour H-1: one event, no overlap with the query window.
        let prev_hour = 0i64;
        let mut w = BlockWriter::create(registry.path_for_hour(prev_hour)).unwrap();
        w.ingest(Event::new(
            "e1",
            1_800 * 1_000_000_000,
            EventType::Create,
            ResourceMetadata {
                group: String::new(),
                version: "v1".into(),
                kind: "Pod".into(),
                namespace: "default".into(),
                name: "p".into(),
                uid: "u1".into(),
                involved_object_uid: None,
            },
            serde_json::json!({}),
        ));
        w.seal().unwrap();

        // Hour H: empty of events for the same key, but query window is here.
        let this_hour = 3600i64;
        let w2 = BlockWriter::create(registry.path_for_hour(this_hour)).unwrap();
        w2.seal().unwrap();

        let (start_ns, end_ns) = hour_range_ns(this_hour);
        let candidates = registry.candidate_files(start_ns, end_ns).unwrap();
        assert!(candidates.iter().any(|f| f.hour_start_sec == prev_hour));
        assert!(candidates.iter().any(|f| f.hour_start_sec == this_hour));
    }
}
