//! Local change detection and invalidation broadcast.
//!
//! [`InvalidationTrigger`] is called by write paths after a tracked item was
//! saved. The local cache is invalidated synchronously; the cluster broadcast
//! is spawned and never awaited by the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::domain::nodes::{Node, NodeId};

use super::cluster::ClusterBroadcaster;
use super::index::PathIndex;
use super::lock::mutex_lock;
use super::messages::{ClusterMessage, INVALIDATE_ALL_TYPE, MemberId, invalidate_type};
use super::registry::CacheContext;
use super::tree::TreeCache;

const SOURCE: &str = "cache::trigger";

pub(crate) const METRIC_BROADCAST_SENT_TOTAL: &str = "treecache_broadcast_sent_total";

/// One logical change of one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChangeKey {
    kind: &'static str,
    id: NodeId,
    modified_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// Claimed; the local invalidation is still running.
    Pending,
    Notified,
}

pub struct InvalidationTrigger {
    context: Arc<CacheContext>,
    cluster: Option<Arc<dyn ClusterBroadcaster>>,
    notified: Arc<Mutex<HashMap<ChangeKey, Mark>>>,
}

impl InvalidationTrigger {
    /// Create a trigger. Without a cluster only local caches are invalidated.
    pub fn new(context: Arc<CacheContext>, cluster: Option<Arc<dyn ClusterBroadcaster>>) -> Self {
        if let Some(cluster) = &cluster {
            cluster.register_message_type(INVALIDATE_ALL_TYPE);
        }
        Self {
            context,
            cluster,
            notified: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn context(&self) -> &Arc<CacheContext> {
        &self.context
    }

    /// Start tracking changes for `cache`.
    ///
    /// Registers the kind's message type and forgets notified changes of
    /// that kind whenever the cache drops its snapshot.
    pub fn track<I: PathIndex>(&self, cache: &TreeCache<I>) {
        let kind = cache.index().kind();
        if let Some(cluster) = &self.cluster {
            cluster.register_message_type(&invalidate_type(kind));
        }

        let notified = Arc::clone(&self.notified);
        cache.on_instance_changed(move |kind| {
            mutex_lock(&notified, SOURCE, "instance_changed")
                .retain(|key, mark| key.kind != kind || *mark == Mark::Pending);
        });
        debug!(cache_kind = kind, "Trigger tracking cache kind");
    }

    /// Report that `node`, an item of the tracked `kind`, changed.
    ///
    /// Returns false when this exact change was already handled.
    pub fn item_changed(&self, kind: &'static str, node: &Node) -> bool {
        let key = ChangeKey {
            kind,
            id: node.id,
            modified_at: node.modified_at,
        };

        let claimed = {
            let mut notified = mutex_lock(&self.notified, SOURCE, "claim");
            let fresh = !notified.contains_key(&key);
            if fresh {
                notified.insert(key.clone(), Mark::Pending);
            }
            fresh
        };
        if !claimed {
            debug!(
                cache_kind = kind,
                node_id = %node.id,
                "Change already notified, skipping broadcast"
            );
            return false;
        }

        // Pending marks survive the eviction hook fired by this invalidation.
        self.context.invalidate(kind);
        if let Some(mark) = mutex_lock(&self.notified, SOURCE, "settle").get_mut(&key) {
            *mark = Mark::Notified;
        }

        info!(
            cache_kind = kind,
            node_id = %node.id,
            path = %node.path,
            "Tracked item changed"
        );
        self.broadcast(|sender| ClusterMessage::invalidate(sender, kind));
        true
    }

    /// Invalidate every cache locally and on all members.
    pub fn invalidate_all(&self) -> usize {
        let count = self.context.invalidate_all();
        mutex_lock(&self.notified, SOURCE, "invalidate_all").clear();
        self.broadcast(ClusterMessage::invalidate_all);
        count
    }

    fn broadcast<F>(&self, build: F)
    where
        F: FnOnce(MemberId) -> ClusterMessage,
    {
        let Some(cluster) = &self.cluster else {
            return;
        };
        let message = build(cluster.member_id());
        let message_type = message.message_type();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                message_type = %message_type,
                "No async runtime available, invalidation not broadcast"
            );
            return;
        };

        let cluster = Arc::clone(cluster);
        runtime.spawn(async move {
            let message_id = message.id;
            match cluster.send(message).await {
                Ok(()) => {
                    counter!(METRIC_BROADCAST_SENT_TOTAL, "type" => message_type.clone())
                        .increment(1);
                    debug!(
                        message_id = %message_id,
                        message_type = %message_type,
                        "Invalidation broadcast"
                    );
                }
                Err(err) => {
                    warn!(
                        message_id = %message_id,
                        message_type = %message_type,
                        error = %err,
                        "Invalidation broadcast failed"
                    );
                }
            }
        });
    }
}
