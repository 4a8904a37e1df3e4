//! Applies received invalidation messages to a cache context.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, instrument};

use super::cluster::{ClusterBroadcaster, MessageHandler};
use super::messages::{ClusterMessage, MessageKind};
use super::registry::CacheContext;

pub(crate) const METRIC_BROADCAST_RECEIVED_TOTAL: &str = "treecache_broadcast_received_total";

/// Cluster handler invalidating local caches.
///
/// Own echoes and remote messages are applied alike: invalidation is
/// idempotent, so the sender's echo costs at most one extra rebuild.
pub struct InvalidationConsumer {
    context: Arc<CacheContext>,
}

impl InvalidationConsumer {
    pub fn new(context: Arc<CacheContext>) -> Self {
        Self { context }
    }

    /// Create a consumer for `context` and subscribe it to `cluster`.
    pub fn attach(context: Arc<CacheContext>, cluster: &dyn ClusterBroadcaster) -> Arc<Self> {
        let consumer = Arc::new(Self::new(context));
        cluster.subscribe(consumer.clone());
        debug!(member_id = %cluster.member_id(), "Invalidation consumer attached");
        consumer
    }
}

impl MessageHandler for InvalidationConsumer {
    #[instrument(skip_all, fields(message_id = %message.id, sender = %message.sender))]
    fn handle(&self, message: &ClusterMessage, is_from_self: bool, is_from_remote: bool) {
        let origin = if is_from_self { "self" } else { "remote" };
        counter!(METRIC_BROADCAST_RECEIVED_TOTAL, "origin" => origin).increment(1);

        match &message.kind {
            MessageKind::Invalidate { cache } => {
                let applied = self.context.invalidate(cache);
                info!(
                    cache_kind = %cache,
                    is_from_self,
                    is_from_remote,
                    applied,
                    "Invalidation message applied"
                );
            }
            MessageKind::InvalidateAll => {
                let count = self.context.invalidate_all();
                info!(
                    count,
                    is_from_self,
                    is_from_remote,
                    "Invalidate-all message applied"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::application::repos::StoreError;
    use crate::cache::index::{PathIndex, TreeCacheEntry};

    struct Items;

    #[async_trait]
    impl PathIndex for Items {
        type Payload = ();

        fn kind(&self) -> &'static str {
            "items"
        }

        async fn load(&self) -> Result<Vec<TreeCacheEntry<()>>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn remote_invalidation_clears_cache() {
        let context = Arc::new(CacheContext::new());
        let cache = context.register(Items).expect("register");
        cache.get_instance().await.expect("build");

        let consumer = InvalidationConsumer::new(context);
        consumer.handle(
            &ClusterMessage::invalidate(Uuid::new_v4(), "items"),
            false,
            true,
        );

        assert!(cache.current().is_none());
    }

    #[tokio::test]
    async fn duplicate_delivery_is_harmless() {
        let context = Arc::new(CacheContext::new());
        let cache = context.register(Items).expect("register");
        cache.get_instance().await.expect("build");

        let consumer = InvalidationConsumer::new(context);
        let message = ClusterMessage::invalidate(Uuid::new_v4(), "items");
        consumer.handle(&message, true, false);
        consumer.handle(&message, true, false);

        assert!(cache.current().is_none());
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let context = Arc::new(CacheContext::new());
        let consumer = InvalidationConsumer::new(context);
        consumer.handle(
            &ClusterMessage::invalidate(Uuid::new_v4(), "nobody"),
            false,
            true,
        );
    }

    #[tokio::test]
    async fn invalidate_all_reaches_every_cache() {
        let context = Arc::new(CacheContext::new());
        let cache = context.register(Items).expect("register");
        cache.get_instance().await.expect("build");

        InvalidationConsumer::new(context).handle(
            &ClusterMessage::invalidate_all(Uuid::new_v4()),
            false,
            true,
        );

        assert!(cache.current().is_none());
    }
}
