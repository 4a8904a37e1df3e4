//! Path indexes feeding tree caches.

use async_trait::async_trait;

use crate::application::repos::StoreError;
use crate::domain::nodes::NodeId;

/// One tracked item, tagged with its store path.
///
/// The payload is whatever the index chooses to materialize; callers needing
/// the full item load it by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeCacheEntry<T> {
    pub path: String,
    pub id: NodeId,
    pub payload: T,
}

/// Source of the entries of one tracked kind.
#[async_trait]
pub trait PathIndex: Send + Sync + 'static {
    type Payload: Clone + Send + Sync + 'static;

    /// Stable name of the tracked kind. Invalidation messages address caches
    /// by this name, so it must be identical on every cluster member.
    fn kind(&self) -> &'static str;

    /// Every tracked entry currently in the store, in any order. No matches
    /// yields an empty vector.
    async fn load(&self) -> Result<Vec<TreeCacheEntry<Self::Payload>>, StoreError>;
}
