//! Hierarchical cache with nearest-ancestor lookup.
//!
//! A [`TreeCache`] owns one slot holding the current [`TreeCacheSnapshot`] of
//! its index. Reads that find the slot filled never touch the build lock.
//! An empty slot is filled under the build lock with a second check after
//! acquiring it, so concurrent first readers trigger exactly one index load
//! and all receive the same `Arc`.
//!
//! Invalidation bumps a generation counter and empties the slot. A build that
//! was overtaken by an invalidation still serves its own callers but is not
//! published, so the next read after an invalidation always rebuilds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument};

use crate::application::repos::StoreError;
use crate::domain::paths;

use super::index::{PathIndex, TreeCacheEntry};
use super::lock::{rw_read, rw_write};
use super::snapshot::TreeCacheSnapshot;

const SOURCE: &str = "cache::tree";

pub(crate) const METRIC_SNAPSHOT_BUILD_TOTAL: &str = "treecache_snapshot_build_total";
pub(crate) const METRIC_SNAPSHOT_BUILD_MS: &str = "treecache_snapshot_build_ms";
pub(crate) const METRIC_INVALIDATE_TOTAL: &str = "treecache_invalidate_total";

/// Callback run after a cache's slot has been cleared.
pub type InstanceChangedHook = Box<dyn Fn(&'static str) + Send + Sync>;

/// Type-erased view of a tree cache, used by the context registry.
pub trait CacheHandle: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Drop the current snapshot. Returns whether one was present.
    fn invalidate(&self) -> bool;

    fn is_built(&self) -> bool;
}

pub struct TreeCache<I: PathIndex> {
    index: I,
    slot: RwLock<Option<Arc<TreeCacheSnapshot<I::Payload>>>>,
    build_lock: AsyncMutex<()>,
    generation: AtomicU64,
    hooks: RwLock<Vec<InstanceChangedHook>>,
}

impl<I: PathIndex> TreeCache<I> {
    pub fn new(index: I) -> Self {
        Self {
            index,
            slot: RwLock::new(None),
            build_lock: AsyncMutex::new(()),
            generation: AtomicU64::new(0),
            hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// The published snapshot, if any, without building one.
    pub fn current(&self) -> Option<Arc<TreeCacheSnapshot<I::Payload>>> {
        rw_read(&self.slot, SOURCE, "current").clone()
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Return the published snapshot, building it first if the slot is empty.
    ///
    /// Store failures while loading the index propagate and leave the slot
    /// empty.
    #[instrument(skip(self), fields(cache_kind = self.index.kind()))]
    pub async fn get_instance(&self) -> Result<Arc<TreeCacheSnapshot<I::Payload>>, StoreError> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let _build = self.build_lock.lock().await;
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let kind = self.index.kind();
        let generation = self.generation();
        let started_at = Instant::now();
        let entries = self.index.load().await?;
        let snapshot = Arc::new(TreeCacheSnapshot::build(kind, entries, generation));

        counter!(METRIC_SNAPSHOT_BUILD_TOTAL, "kind" => kind).increment(1);
        histogram!(METRIC_SNAPSHOT_BUILD_MS, "kind" => kind)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let mut slot = rw_write(&self.slot, SOURCE, "publish");
        if self.generation() == generation {
            *slot = Some(Arc::clone(&snapshot));
            info!(
                cache_kind = kind,
                generation,
                entries = snapshot.len(),
                "Tree cache snapshot published"
            );
        } else {
            info!(
                cache_kind = kind,
                generation,
                current_generation = self.generation(),
                "Tree cache snapshot overtaken by invalidation, not published"
            );
        }

        Ok(snapshot)
    }

    /// Walk from `context_path` towards `root` (the root itself excluded)
    /// and return the first entry whose path equals `transform(ancestor)`.
    pub async fn find_nearest_item<F>(
        &self,
        context_path: &str,
        root: &str,
        transform: F,
    ) -> Result<Option<TreeCacheEntry<I::Payload>>, StoreError>
    where
        F: Fn(&str) -> String,
    {
        let snapshot = self.get_instance().await?;
        for ancestor in paths::ancestor_walk(context_path, root) {
            let candidate = transform(ancestor);
            if let Some(entry) = snapshot.get(&candidate) {
                debug!(
                    cache_kind = self.index.kind(),
                    context_path,
                    found = %entry.path,
                    "Nearest item resolved"
                );
                return Ok(Some(entry.clone()));
            }
        }
        Ok(None)
    }

    /// Register a callback fired after every invalidation.
    pub fn on_instance_changed<F>(&self, hook: F)
    where
        F: Fn(&'static str) + Send + Sync + 'static,
    {
        rw_write(&self.hooks, SOURCE, "on_instance_changed").push(Box::new(hook));
    }

    /// Mark the current snapshot stale. Safe to call repeatedly.
    pub fn invalidate(&self) -> bool {
        let kind = self.index.kind();
        let previous = {
            let mut slot = rw_write(&self.slot, SOURCE, "invalidate");
            self.generation.fetch_add(1, Ordering::SeqCst);
            slot.take()
        };

        for hook in rw_read(&self.hooks, SOURCE, "invalidate.hooks").iter() {
            hook(kind);
        }

        counter!(METRIC_INVALIDATE_TOTAL, "kind" => kind).increment(1);
        info!(
            cache_kind = kind,
            had_instance = previous.is_some(),
            generation = self.generation(),
            "Tree cache invalidated"
        );
        previous.is_some()
    }
}

impl<I: PathIndex> CacheHandle for TreeCache<I> {
    fn kind(&self) -> &'static str {
        self.index.kind()
    }

    fn invalidate(&self) -> bool {
        TreeCache::invalidate(self)
    }

    fn is_built(&self) -> bool {
        self.current().is_some()
    }
}
