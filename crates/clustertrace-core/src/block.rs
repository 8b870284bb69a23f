//! On-disk metadata shapes shared between the writer, reader, and executor:
//! [`BlockMeta`], [`GlobalStats`], [`ResourceLastState`], and the [`FileIndex`]
//! footer that ties them together (§3.1, §6.1).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{EventType, ResourceKey};

/// Monotonic id of a block within its file.
pub type BlockId = u64;

/// A contiguous group of events stored together and addressed as a unit
/// (§3.1). Sealed blocks are immutable (§3.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    pub id: BlockId,
    pub timestamp_min: i64,
    pub timestamp_max: i64,
    /// Exact: a value is present iff at least one event in the block has it
    /// (invariant I5).
    pub kind_set: BTreeSet<String>,
    pub namespace_set: BTreeSet<String>,
    pub group_set: BTreeSet<String>,
    pub offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub event_count: u64,
}

impl BlockMeta {
    /// Invariant I1: every sealed block has `timestamp_min <= timestamp_max`
    /// and a non-empty event count.
    pub fn is_well_formed(&self) -> bool {
        self.timestamp_min <= self.timestamp_max && self.event_count > 0
    }
}

/// Global statistics across all events in a sealed file (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub timestamp_min: i64,
    pub timestamp_max: i64,
    pub event_count: u64,
}

impl GlobalStats {
    /// Folds one block's stats into a running total. Used both by the
    /// writer, incrementally as blocks seal, and by tests asserting
    /// invariant I2 (footer fidelity).
    pub fn fold(acc: Option<Self>, block: &BlockMeta) -> Self {
        match acc {
            None => Self {
                timestamp_min: block.timestamp_min,
                timestamp_max: block.timestamp_max,
                event_count: block.event_count,
            },
            Some(s) => Self {
                timestamp_min: s.timestamp_min.min(block.timestamp_min),
                timestamp_max: s.timestamp_max.max(block.timestamp_max),
                event_count: s.event_count + block.event_count,
            },
        }
    }

    pub fn from_blocks(blocks: &[BlockMeta]) -> Option<Self> {
        blocks.iter().fold(None, |acc, b| Some(Self::fold(acc, b)))
    }
}

/// Per-file final-state record used to reconstruct point-in-time snapshots
/// (§3.1). `DELETE` is recorded, not removed; it represents terminal state
/// (invariant I3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLastState {
    pub uid: String,
    pub event_type: EventType,
    pub timestamp: i64,
    pub resource_data: Value,
}

/// The footer written at file-seal time: block metadata array, global
/// statistics, and the final-state map (§3.1, §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIndex {
    pub blocks: Vec<BlockMeta>,
    pub global_stats: GlobalStats,
    pub final_resource_state: BTreeMap<ResourceKey, ResourceLastState>,
}

impl FileIndex {
    /// Invariant I2: the footer's global stats match the union of all block
    /// stats.
    pub fn stats_are_consistent(&self) -> bool {
        match GlobalStats::from_blocks(&self.blocks) {
            Some(computed) => computed == self.global_stats,
            None => self.blocks.is_empty(),
        }
    }

    /// Invariant: block ids and offsets are strictly increasing within a
    /// sealed file (§4.3, §8.1 item 5).
    pub fn blocks_monotonic(&self) -> bool {
        self.blocks
            .windows(2)
            .all(|pair| pair[0].id < pair[1].id && pair[0].offset < pair[1].offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: BlockId, min: i64, max: i64, count: u64, offset: u64) -> BlockMeta {
        BlockMeta {
            id,
            timestamp_min: min,
            timestamp_max: max,
            kind_set: BTreeSet::new(),
            namespace_set: BTreeSet::new(),
            group_set: BTreeSet::new(),
            offset,
            compressed_size: 10,
            uncompressed_size: 20,
            event_count: count,
        }
    }

    #[test]
    fn global_stats_fold_matches_union() {
        let blocks = vec![block(0, 100, 200, 3, 0), block(1, 50, 150, 2, 64)];
        let stats = GlobalStats::from_blocks(&blocks).unwrap();
        assert_eq!(stats.timestamp_min, 50);
        assert_eq!(stats.timestamp_max, 200);
        assert_eq!(stats.event_count, 5);
    }

    #[test]
    fn index_detects_non_monotonic_blocks() {
        let good = FileIndex {
            blocks: vec![block(0, 1, 2, 1, 0), block(1, 3, 4, 1, 64)],
            global_stats: GlobalStats { timestamp_min: 1, timestamp_max: 4, event_count: 2 },
            final_resource_state: BTreeMap::new(),
        };
        assert!(good.blocks_monotonic());
        assert!(good.stats_are_consistent());

        let bad = FileIndex {
            blocks: vec![block(1, 1, 2, 1, 64), block(0, 3, 4, 1, 0)],
            ..good
        };
        assert!(!bad.blocks_monotonic());
    }
}
