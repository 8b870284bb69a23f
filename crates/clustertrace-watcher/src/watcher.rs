//! Orchestrates one `kube::runtime::watcher` stream per configured kind
//! (§4.1). Each kind owns an independent Tokio task; [`ResourceWatcher::reconcile`]
//! diffs a new desired kind set against the active one, cancelling removed
//! subscriptions and spawning new ones without disturbing kept ones.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use clustertrace_core::config::WatchedKind;
use clustertrace_core::event::Event as CtEvent;
use futures::StreamExt;
use kube::api::ApiResource;
use kube::core::{DynamicObject, GroupVersionKind};
use kube::runtime::watcher::{self, Event as WatchEvent};
use kube::{Api, Client};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::Backoff;
use crate::error::WatchError;
use crate::mapping::{resource_metadata_for, SessionSeen};

struct TaskHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Owns the set of currently-running per-kind watch tasks and the channel
/// they feed events into (§4.1, §5).
pub struct ResourceWatcher {
    client: Client,
    sink: mpsc::Sender<CtEvent>,
    active: HashMap<WatchedKind, TaskHandle>,
}

impl ResourceWatcher {
    pub fn new(client: Client, sink: mpsc::Sender<CtEvent>) -> Self {
        Self {
            client,
            sink,
            active: HashMap::new(),
        }
    }

    /// Starts watching every entry in `desired` that isn't already active,
    /// and gracefully cancels any active entry no longer present (the
    /// "please remount" reload path, §4.1, §6).
    #[instrument(skip(self, desired))]
    pub fn reconcile(&mut self, desired: &[WatchedKind]) {
        let desired: std::collections::HashSet<WatchedKind> = desired.iter().cloned().collect();

        self.active.retain(|kind, handle| {
            if desired.contains(kind) {
                true
            } else {
                info!(?kind, "removed from watcher config; cancelling subscription");
                handle.cancel.cancel();
                false
            }
        });

        for kind in desired {
            if self.active.contains_key(&kind) {
                continue;
            }
            let cancel = CancellationToken::new();
            let join = tokio::spawn(run_kind_watch(self.client.clone(), kind.clone(), self.sink.clone(), cancel.clone()));
            info!(?kind, "started watch subscription");
            self.active.insert(kind, TaskHandle { cancel, join });
        }
    }

    /// Cancels every active subscription and waits for the tasks to exit.
    pub async fn shutdown(self) {
        for handle in self.active.values() {
            handle.cancel.cancel();
        }
        for (kind, handle) in self.active {
            if let Err(e) = handle.join.await {
                error!(?kind, error = %e, "watch task panicked during shutdown");
            }
        }
    }
}

fn now_ns() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as i64).unwrap_or(0)
}

fn event_id(resource: &clustertrace_core::event::ResourceMetadata, resource_version: &str, suffix: &str) -> String {
    format!("{}-{}-{}-{suffix}", resource.uid, resource.key(), resource_version)
}

/// Builds the `Api<DynamicObject>` for one configured kind. `None`
/// namespaces (or an empty list) watches cluster-wide.
fn api_for(client: Client, watched: &WatchedKind) -> Api<DynamicObject> {
    let gvk = GroupVersionKind::gvk(&watched.group, &watched.version, &watched.kind);
    let resource = ApiResource::from_gvk(&gvk);
    match &watched.namespaces {
        Some(namespaces) if !namespaces.is_empty() => {
            // Only the first configured namespace anchors the `Api` type;
            // see DESIGN.md for the multi-namespace tracking decision.
            Api::namespaced_with(client, &namespaces[0], &resource)
        }
        _ => Api::all_with(client, &resource),
    }
}

#[instrument(skip(client, sink, cancel), fields(group = %watched.group, version = %watched.version, kind = %watched.kind))]
async fn run_kind_watch(client: Client, watched: WatchedKind, sink: mpsc::Sender<CtEvent>, cancel: CancellationToken) {
    let api = api_for(client, &watched);
    let mut backoff = Backoff::new();
    let mut session = SessionSeen::new();

    'reconnect: loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut stream = Box::pin(watcher::watcher(api.clone(), watcher::Config::default()));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                next = stream.next() => {
                    match next {
                        Some(Ok(event)) => {
                            backoff.reset();
                            handle_watch_event(event, &watched, &mut session, &sink).await;
                        }
                        Some(Err(e)) => {
                            let watch_error = WatchError::from(e);
                            if watch_error.is_permanent() {
                                error!(error = %watch_error, "permanent watch error; dropping this kind");
                                return;
                            }
                            warn!(error = %watch_error, "watch stream error; will resubscribe after backoff");
                            let delay = backoff.next_delay();
                            tokio::time::sleep(delay).await;
                            continue 'reconnect;
                        }
                        None => {
                            debug!("watch stream ended; resubscribing immediately");
                            continue 'reconnect;
                        }
                    }
                }
            }
        }
    }
}

async fn handle_watch_event(
    event: WatchEvent<DynamicObject>,
    watched: &WatchedKind,
    session: &mut SessionSeen,
    sink: &mpsc::Sender<CtEvent>,
) {
    use clustertrace_core::event::EventType;

    match event {
        WatchEvent::Init | WatchEvent::InitDone => {}
        WatchEvent::InitApply(obj) => {
            // List-replay: every pre-existing object is a synthetic CREATE
            // observed at watch start (§4.1).
            let resource = resource_metadata_for(watched, &obj);
            let resource_version = obj.metadata.resource_version.clone().unwrap_or_default();
            session.classify_apply(&resource);
            emit(sink, &resource, EventType::Create, &resource_version, &obj.data).await;
        }
        WatchEvent::Apply(obj) => {
            let resource = resource_metadata_for(watched, &obj);
            let resource_version = obj.metadata.resource_version.clone().unwrap_or_default();
            let event_type = session.classify_apply(&resource);
            emit(sink, &resource, event_type, &resource_version, &obj.data).await;
        }
        WatchEvent::Delete(obj) => {
            let resource = resource_metadata_for(watched, &obj);
            let resource_version = obj.metadata.resource_version.clone().unwrap_or_default();
            session.forget(&resource);
            emit(sink, &resource, EventType::Delete, &resource_version, &obj.data).await;
        }
    }
}

async fn emit(
    sink: &mpsc::Sender<CtEvent>,
    resource: &clustertrace_core::event::ResourceMetadata,
    event_type: clustertrace_core::event::EventType,
    resource_version: &str,
    data: &serde_json::Value,
) {
    let id = event_id(resource, resource_version, &event_type.to_string());
    let ct_event = CtEvent::new(id, now_ns(), event_type, resource.clone(), data.clone());
    // Backpressure: a full channel makes the watcher block rather than drop
    // (§4.1, §5); the pipeline is the intentionally slower side.
    if sink.send(ct_event).await.is_err() {
        warn!("pipeline channel closed; dropping watch event");
    }
}
