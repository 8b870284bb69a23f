//! Predicate evaluation, pure and synchronous (§4.6). No regex, no
//! wildcards, no cross-field joins; exact string match per field, with an
//! empty filter value meaning "match anything".

use clustertrace_core::block::BlockMeta;
use clustertrace_core::event::ResourceMetadata;
use serde::Deserialize;

/// One query's selection predicate. An empty string in any field matches
/// every value for that field (§4.6).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.group.is_empty() && self.version.is_empty() && self.kind.is_empty() && self.namespace.is_empty()
    }
}

/// Early pruning: `true` iff every non-empty filter value appears in the
/// block's corresponding summary set. `version` has no per-block set, so it
/// is not part of block-level pruning; only per-event filtering checks it.
pub fn block_matches_filters(meta: &BlockMeta, filters: &Filters) -> bool {
    if !filters.group.is_empty() && !meta.group_set.contains(&filters.group) {
        return false;
    }
    if !filters.kind.is_empty() && !meta.kind_set.contains(&filters.kind) {
        return false;
    }
    if !filters.namespace.is_empty() && !meta.namespace_set.contains(&filters.namespace) {
        return false;
    }
    true
}

/// Exact-match, per-event (§4.6).
pub fn matches_filters(resource: &ResourceMetadata, filters: &Filters) -> bool {
    (filters.group.is_empty() || filters.group == resource.group)
        && (filters.version.is_empty() || filters.version == resource.version)
        && (filters.kind.is_empty() || filters.kind == resource.kind)
        && (filters.namespace.is_empty() || filters.namespace == resource.namespace)
}
