//! The readable mirror of the writer's currently-unflushed events (§3.3
//! invariant I4, §4.5 step 6, §5). Queries consult this instead of
//! acquiring any lock on the writer's open file.

use std::sync::Arc;

use clustertrace_core::event::Event;
use parking_lot::RwLock as PLRwLock;

/// Cheap, `Clone`-able handle to the live (unflushed) event buffer. The
/// writer task is the only one that mutates it; queries only read.
#[derive(Clone)]
pub struct BufferHandle {
    inner: Arc<PLRwLock<Vec<Event>>>,
}

impl BufferHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PLRwLock::new(Vec::new())),
        }
    }

    /// Appends an event to the mirror. Only the writer task calls this in
    /// normal operation, but it carries no invariant that would make
    /// restricting it to the crate worthwhile; exposed so query-side tests
    /// can seed a buffer directly without a running pipeline.
    pub fn push(&self, event: Event) {
        self.inner.write().push(event);
    }

    /// Clears the mirror. Called whenever the writer flushes its pending
    /// events into a sealed block, since those events are no longer
    /// "unflushed" per invariant I4, even though the containing file may
    /// still be open.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// A point-in-time copy of every currently-unflushed event. Cheap
    /// enough for query frequency given the buffer is bounded by the
    /// block-size/flush-interval triggers (nominal 1-4 MiB / 10-60s).
    pub fn snapshot(&self) -> Vec<Event> {
        self.inner.read().clone()
    }
}

impl Default for BufferHandle {
    fn default() -> Self {
        Self::new()
    }
}
