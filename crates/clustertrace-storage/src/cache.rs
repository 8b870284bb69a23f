//! A size-bounded LRU of decoded blocks, shared across concurrent queries
//! (§4.7). Eviction granularity is the block; accounting is by approximate
//! decoded size.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use clustertrace_core::{block::BlockId, event::Event};
use lru::LruCache;
use parking_lot::Mutex;

type CacheKey = (Arc<Path>, BlockId);

/// Process-wide cache, constructed once at startup with its MB budget and
/// torn down at shutdown (§9: "effectively a process singleton"). A budget
/// of `0` disables the cache entirely; [`BlockCache::get`] always misses and
/// [`BlockCache::insert`] is a no-op, matching §6.5's `cacheMaxMB: 0`.
pub struct BlockCache {
    inner: Option<Mutex<Inner>>,
}

struct Inner {
    lru: LruCache<CacheKey, Arc<Vec<Event>>>,
    budget_bytes: usize,
    used_bytes: usize,
}

/// Rough per-event overhead used to approximate a block's decoded size,
/// since we don't want to re-serialize on every cache accounting check.
const PER_EVENT_OVERHEAD_BYTES: usize = 256;

fn approx_decoded_size(events: &[Event]) -> usize {
    events.iter().map(|e| e.data_size as usize + PER_EVENT_OVERHEAD_BYTES).sum()
}

impl BlockCache {
    pub fn new(budget_mb: u64) -> Self {
        if budget_mb == 0 {
            return Self { inner: None };
        }
        let budget_bytes = (budget_mb as usize) * 1024 * 1024;
        // LruCache requires a capacity bound on entry count too; we pick a
        // generously large one and let the byte-budget eviction do the real
        // work, since entries vary wildly in size.
        let cap = NonZeroUsize::new(1 << 20).expect("nonzero literal");
        Self {
            inner: Some(Mutex::new(Inner {
                lru: LruCache::new(cap),
                budget_bytes,
                used_bytes: 0,
            })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get(&self, path: &Arc<Path>, block_id: BlockId) -> Option<Arc<Vec<Event>>> {
        let inner = self.inner.as_ref()?;
        let mut guard = inner.lock();
        guard.lru.get(&(path.clone(), block_id)).cloned()
    }

    pub fn insert(&self, path: Arc<Path>, block_id: BlockId, events: Arc<Vec<Event>>) {
        let Some(inner) = self.inner.as_ref() else { return };
        let mut guard = inner.lock();
        let size = approx_decoded_size(&events);

        while guard.used_bytes + size > guard.budget_bytes {
            match guard.lru.pop_lru() {
                Some((_, evicted)) => guard.used_bytes -= approx_decoded_size(&evicted),
                None => break,
            }
        }

        guard.used_bytes += size;
        guard.lru.put((path, block_id), events);
    }

    /// Current approximate resident size, for tests and diagnostics.
    pub fn used_bytes(&self) -> usize {
        self.inner.as_ref().map(|i| i.lock().used_bytes).unwrap_or(0)
    }
}
