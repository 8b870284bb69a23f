//! The [`Event`] type is the unit of ingestion and storage: produced once by
//! the watcher, never mutated, and either written into exactly one block of
//! one file or lost if the service terminates before flush (§4.3).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One of the three lifecycle transitions the watcher can observe for a
/// resource. `CREATE` also covers the synthetic list-replay event emitted
/// for every pre-existing object at watch start (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Create => write!(f, "CREATE"),
            EventType::Update => write!(f, "UPDATE"),
            EventType::Delete => write!(f, "DELETE"),
        }
    }
}

/// Composite identity of the object an [`Event`] refers to (§3.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// Empty for the core API group.
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Empty for cluster-scoped objects.
    pub namespace: String,
    pub name: String,
    /// Durable identifier issued by the cluster API. May be reissued across
    /// watcher resyncs for the logically "same" object (§9 open question 3).
    pub uid: String,
    /// For `Event`-kind records, the UID of the subject the event is about.
    /// `None` when the payload was missing or malformed, or for non-`Event`
    /// kinds; the watcher never drops an event over this (§4.1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub involved_object_uid: Option<String>,
}

impl ResourceMetadata {
    /// `true` for the case-insensitive `Kind == "Event"` match that triggers
    /// `involvedObject.uid` enrichment (§4.1).
    pub fn is_event_kind(&self) -> bool {
        self.kind.eq_ignore_ascii_case("Event")
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.group, &self.version, &self.kind, &self.namespace, &self.name)
    }
}

/// The canonical join key for grouping events by logical object across time:
/// `group/version/kind/namespace/name`. Stable across UID reissuance; the
/// engine keys the final-state map by this, never by `uid` (§9 open
/// question 3, §3.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(group: &str, version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self(format!("{group}/{version}/{kind}/{namespace}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the `(group, version, kind, namespace, name)` components of
    /// a key. Used by the executor to reconstruct [`ResourceMetadata`] for
    /// synthetic snapshot events (§4.5 step 5).
    pub fn split(&self) -> Option<(&str, &str, &str, &str, &str)> {
        let mut parts = self.0.splitn(5, '/');
        let group = parts.next()?;
        let version = parts.next()?;
        let kind = parts.next()?;
        let namespace = parts.next()?;
        let name = parts.next()?;
        Some((group, version, kind, namespace, name))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit of ingestion and storage (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Producer-generated; never reused within a file, but the watcher
    /// regenerates ids across resync boundaries, so writers deduplicate by
    /// `id` only within the scope of a single flush, not globally.
    pub id: String,
    /// Nanoseconds since epoch; the wall-clock moment the event was
    /// observed, not the object's own timestamps.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub resource: ResourceMetadata,
    /// Opaque JSON payload (full object or patch). Never interpreted by the
    /// engine.
    pub data: Value,
    pub data_size: u64,
}

impl Event {
    pub fn new(id: impl Into<String>, timestamp: i64, event_type: EventType, resource: ResourceMetadata, data: Value) -> Self {
        let data_size = serde_json::to_vec(&data).map(|b| b.len() as u64).unwrap_or(0);
        Self {
            id: id.into(),
            timestamp,
            event_type,
            resource,
            data,
            data_size,
        }
    }

    pub fn key(&self) -> ResourceKey {
        self.resource.key()
    }
}
