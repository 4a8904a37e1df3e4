//! Per-context cache registry.
//!
//! Maps each index type to its single [`TreeCache`] holder. Components receive
//! a [`CacheContext`] explicitly; separate contexts never share state.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::{debug, info};

use super::index::PathIndex;
use super::tree::{CacheHandle, TreeCache};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("cache kind `{kind}` is already registered by another index type")]
    KindConflict { kind: &'static str },
}

struct Registered {
    handle: Arc<dyn CacheHandle>,
    typed: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct CacheContext {
    caches: DashMap<TypeId, Registered>,
}

impl CacheContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `index` and return its cache.
    ///
    /// Registration is get-or-insert: when the index type is already known the
    /// existing cache is returned and `index` is dropped.
    pub fn register<I: PathIndex>(&self, index: I) -> Result<Arc<TreeCache<I>>, RegistryError> {
        let kind = index.kind();
        let type_id = TypeId::of::<I>();

        let conflict = self
            .caches
            .iter()
            .any(|entry| *entry.key() != type_id && entry.value().handle.kind() == kind);
        if conflict {
            return Err(RegistryError::KindConflict { kind });
        }

        match self.caches.entry(type_id) {
            Entry::Occupied(existing) => {
                debug!(cache_kind = kind, "Cache already registered");
                downcast::<I>(&existing.get().typed).ok_or(RegistryError::KindConflict { kind })
            }
            Entry::Vacant(slot) => {
                let cache = Arc::new(TreeCache::new(index));
                slot.insert(Registered {
                    handle: cache.clone(),
                    typed: cache.clone(),
                });
                info!(cache_kind = kind, "Cache registered");
                Ok(cache)
            }
        }
    }

    /// The cache for index type `I`, if registered.
    pub fn get<I: PathIndex>(&self) -> Option<Arc<TreeCache<I>>> {
        self.caches
            .get(&TypeId::of::<I>())
            .and_then(|entry| downcast::<I>(&entry.typed))
    }

    /// Invalidate the cache registered under `kind`.
    ///
    /// Returns false when no cache of that kind exists.
    pub fn invalidate(&self, kind: &str) -> bool {
        let handle = self
            .caches
            .iter()
            .find(|entry| entry.value().handle.kind() == kind)
            .map(|entry| Arc::clone(&entry.value().handle));

        match handle {
            Some(handle) => {
                handle.invalidate();
                true
            }
            None => {
                debug!(cache_kind = kind, "No cache registered for kind");
                false
            }
        }
    }

    /// Invalidate every registered cache. Returns how many were invalidated.
    pub fn invalidate_all(&self) -> usize {
        let handles = self.handles();
        for handle in &handles {
            handle.invalidate();
        }
        info!(count = handles.len(), "All caches invalidated");
        handles.len()
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self
            .caches
            .iter()
            .map(|entry| entry.value().handle.kind())
            .collect();
        kinds.sort_unstable();
        kinds
    }

    /// Whether the cache of `kind` currently holds a snapshot.
    pub fn is_built(&self, kind: &str) -> bool {
        self.caches
            .iter()
            .any(|entry| entry.value().handle.kind() == kind && entry.value().handle.is_built())
    }

    // Collected first so no shard lock is held while hooks run.
    fn handles(&self) -> Vec<Arc<dyn CacheHandle>> {
        self.caches
            .iter()
            .map(|entry| Arc::clone(&entry.value().handle))
            .collect()
    }
}

fn downcast<I: PathIndex>(typed: &Arc<dyn Any + Send + Sync>) -> Option<Arc<TreeCache<I>>> {
    Arc::clone(typed).downcast::<TreeCache<I>>().ok()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::StoreError;
    use crate::cache::index::TreeCacheEntry;

    struct Alpha;
    struct Beta;
    struct AlphaImpostor;

    macro_rules! empty_index {
        ($ty:ty, $kind:literal) => {
            #[async_trait]
            impl PathIndex for $ty {
                type Payload = ();

                fn kind(&self) -> &'static str {
                    $kind
                }

                async fn load(&self) -> Result<Vec<TreeCacheEntry<()>>, StoreError> {
                    Ok(Vec::new())
                }
            }
        };
    }

    empty_index!(Alpha, "alpha");
    empty_index!(Beta, "beta");
    empty_index!(AlphaImpostor, "alpha");

    #[test]
    fn register_is_get_or_insert() {
        let context = CacheContext::new();
        let first = context.register(Alpha).expect("register");
        let second = context.register(Alpha).expect("register again");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &context.get::<Alpha>().expect("get")));
        assert!(context.get::<Beta>().is_none());
    }

    #[test]
    fn kind_names_must_be_unique() {
        let context = CacheContext::new();
        context.register(Alpha).expect("register");

        let err = context.register(AlphaImpostor).err().expect("conflict");
        assert_eq!(err, RegistryError::KindConflict { kind: "alpha" });
    }

    #[tokio::test]
    async fn invalidate_by_kind() {
        let context = CacheContext::new();
        let alpha = context.register(Alpha).expect("register");
        context.register(Beta).expect("register");
        alpha.get_instance().await.expect("build");

        assert!(context.is_built("alpha"));
        assert!(context.invalidate("alpha"));
        assert!(!context.is_built("alpha"));
        assert!(!context.invalidate("missing"));
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_cache() {
        let context = CacheContext::new();
        let alpha = context.register(Alpha).expect("register");
        let beta = context.register(Beta).expect("register");
        alpha.get_instance().await.expect("build");
        beta.get_instance().await.expect("build");

        assert_eq!(context.invalidate_all(), 2);
        assert!(alpha.current().is_none());
        assert!(beta.current().is_none());
        assert_eq!(context.kinds(), vec!["alpha", "beta"]);
    }

    #[test]
    fn contexts_are_isolated() {
        let one = CacheContext::new();
        let two = CacheContext::new();
        let a = one.register(Alpha).expect("register");
        let b = two.register(Alpha).expect("register");

        assert!(!Arc::ptr_eq(&a, &b));
    }
}
