//! Pure, cluster-free mapping from a `kube` dynamic object to this crate's
//! [`ResourceMetadata`]/[`EventType`] shapes (§4.1). Kept free of any
//! `kube::Client`/`Api` so the enrichment and create/update classification
//! logic is unit-testable without a live API server.

use std::collections::HashSet;

use clustertrace_core::config::WatchedKind;
use clustertrace_core::event::{EventType, ResourceMetadata};
use kube::core::DynamicObject;
use serde_json::Value;

/// Case-insensitive `kind == "Event"` match extracts
/// `involvedObject.uid` from the object's raw data (§4.1). Missing or
/// malformed payloads yield `None` without any error; the watcher never
/// drops an event over this.
pub fn extract_involved_object_uid(kind: &str, data: &Value) -> Option<String> {
    if !kind.eq_ignore_ascii_case("Event") {
        return None;
    }
    data.get("involvedObject")?.get("uid")?.as_str().map(str::to_string)
}

/// Builds [`ResourceMetadata`] for a dynamic object observed under
/// `watched`. `watched.group`/`watched.version`/`watched.kind` are
/// authoritative (not read back off the object) since a single configured
/// kind is never ambiguous about its own GVK.
pub fn resource_metadata_for(watched: &WatchedKind, obj: &DynamicObject) -> ResourceMetadata {
    let namespace = obj.metadata.namespace.clone().unwrap_or_default();
    let name = obj.metadata.name.clone().unwrap_or_default();
    let uid = obj.metadata.uid.clone().unwrap_or_default();
    let involved_object_uid = extract_involved_object_uid(&watched.kind, &obj.data);

    ResourceMetadata {
        group: watched.group.clone(),
        version: watched.version.clone(),
        kind: watched.kind.clone(),
        namespace,
        name,
        uid,
        involved_object_uid,
    }
}

/// Per-task session state used to classify a `watcher::Event::Apply` as
/// `CREATE` (first sight of this UID-namespace-name triple this session) or
/// `UPDATE` (§4.1). A `Delete` always clears the triple so recreation under
/// the same identity is treated as a fresh `CREATE`.
#[derive(Debug, Default)]
pub struct SessionSeen {
    seen: HashSet<(String, String, String)>,
}

impl SessionSeen {
    pub fn new() -> Self {
        Self::default()
    }

    fn triple(resource: &ResourceMetadata) -> (String, String, String) {
        (resource.uid.clone(), resource.namespace.clone(), resource.name.clone())
    }

    /// Classifies an `Apply` event and records the triple as seen.
    pub fn classify_apply(&mut self, resource: &ResourceMetadata) -> EventType {
        let triple = Self::triple(resource);
        if self.seen.insert(triple) {
            EventType::Create
        } else {
            EventType::Update
        }
    }

    /// Clears a triple on delete so a later recreation under the identical
    /// identity is observed as `CREATE` again.
    pub fn forget(&mut self, resource: &ResourceMetadata) {
        self.seen.remove(&Self::triple(resource));
    }
}
