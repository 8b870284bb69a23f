//! Typed representation of the document the external config collaborator
//! loads and hands to this engine (§6.5). Loading from a file, hot-reload,
//! and signal handling remain out of scope; this module only defines the
//! shape every constructor in the crate graph needs to take.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `storage.*` options (§6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    pub directory: PathBuf,
    /// Soft upper bound on uncompressed block size, in MiB, before flush.
    pub block_max_size_mb: u64,
    /// Max age of buffered events before flush, in seconds.
    pub flush_interval_sec: u64,
    /// Block-cache budget, in MiB. `0` disables the cache.
    pub cache_max_mb: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./clustertrace-data"),
            block_max_size_mb: 2,
            flush_interval_sec: 30,
            cache_max_mb: 64,
        }
    }
}

impl StorageConfig {
    pub fn block_max_size_bytes(&self) -> u64 {
        self.block_max_size_mb * 1024 * 1024
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_max_mb > 0
    }
}

/// `pipeline.*` options (§6.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Channel capacity between watcher and writer.
    pub buffer_size: usize,
    /// Grace period the writer waits while draining the channel on shutdown
    /// before sealing the current file regardless (§5).
    pub shutdown_grace_sec: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            shutdown_grace_sec: 10,
        }
    }
}

/// One entry of `watcher.kinds` (§6.5): a `(group, version, kind)` triple
/// with an optional namespace scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
    /// `None` means cluster-wide; `Some(vec![])` is treated the same as
    /// `None` by the watcher (watch all namespaces).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,
}

/// The full document recognized by this engine (§6.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    #[serde(rename = "watcher")]
    pub watcher_kinds_wrapper: WatcherSection,
}

/// `watcher.kinds` nests one level deeper than the other two sections
/// (§6.5); this wrapper keeps [`EngineConfig`] a flat, ergonomic struct
/// while still matching the document shape on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatcherSection {
    pub kinds: Vec<WatchedKind>,
}

impl EngineConfig {
    pub fn watcher_kinds(&self) -> &[WatchedKind] {
        &self.watcher_kinds_wrapper.kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_nominal_spec_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.storage.block_max_size_mb, 2);
        assert_eq!(cfg.storage.flush_interval_sec, 30);
        assert_eq!(cfg.pipeline.buffer_size, 1000);
        assert!(cfg.storage.cache_enabled());
    }

    #[test]
    fn zero_cache_budget_disables_cache() {
        let mut cfg = StorageConfig::default();
        cfg.cache_max_mb = 0;
        assert!(!cfg.cache_enabled());
    }

    #[test]
    fn deserializes_from_camel_case_json_document() {
        let doc = r#"{
            "storage": {"directory": "/var/lib/clustertrace", "blockMaxSizeMb": 4, "flushIntervalSec": 15, "cacheMaxMb": 128},
            "pipeline": {"bufferSize": 2000, "shutdownGraceSec": 5},
            "watcher": {"kinds": [{"version": "v1", "kind": "Pod"}]}
        }"#;
        let parsed: EngineConfig = serde_json::from_str(doc).expect("valid document should parse");
        assert_eq!(parsed.storage.block_max_size_mb, 4);
        assert_eq!(parsed.pipeline.buffer_size, 2000);
        assert_eq!(parsed.watcher_kinds().len(), 1);
        assert_eq!(parsed.watcher_kinds()[0].kind, "Pod");
    }
}
