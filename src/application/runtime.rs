//! Wiring of the caches of one process.

use std::sync::Arc;

use tracing::info;

use crate::application::artifacts::{ArtifactStore, PathAggregator, SelfPersistingCache};
use crate::application::repos::NodeStore;
use crate::application::settings::SettingsResolutionCache;
use crate::cache::{
    CacheConfig, CacheContext, ClusterBroadcaster, InvalidationConsumer, InvalidationTrigger,
    RegistryError,
};

/// Everything a process needs to resolve settings and keep its caches in
/// step with the rest of the cluster.
pub struct CacheRuntime {
    config: CacheConfig,
    store: Arc<dyn NodeStore>,
    context: Arc<CacheContext>,
    trigger: Arc<InvalidationTrigger>,
    consumer: Option<Arc<InvalidationConsumer>>,
    settings: SettingsResolutionCache,
    artifacts: Arc<ArtifactStore>,
}

impl CacheRuntime {
    /// Build the runtime. Broadcasting is skipped when `cluster` is `None` or
    /// disabled in `config`.
    pub fn new(
        store: Arc<dyn NodeStore>,
        config: CacheConfig,
        cluster: Option<Arc<dyn ClusterBroadcaster>>,
    ) -> Result<Self, RegistryError> {
        let cluster = cluster.filter(|_| config.enable_broadcast);
        let context = Arc::new(CacheContext::new());
        let consumer = cluster
            .as_deref()
            .map(|cluster| InvalidationConsumer::attach(Arc::clone(&context), cluster));
        let trigger = Arc::new(InvalidationTrigger::new(Arc::clone(&context), cluster));
        let settings = SettingsResolutionCache::new(
            &context,
            Arc::clone(&store),
            config.clone(),
            Some(Arc::clone(&trigger)),
        )?;
        let artifacts = Arc::new(ArtifactStore::new(Arc::clone(&store), config.clone()));

        info!(
            kinds = ?context.kinds(),
            broadcast = consumer.is_some(),
            "Cache runtime ready"
        );
        Ok(Self {
            config,
            store,
            context,
            trigger,
            consumer,
            settings,
            artifacts,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn settings(&self) -> &SettingsResolutionCache {
        &self.settings
    }

    pub fn context(&self) -> &Arc<CacheContext> {
        &self.context
    }

    pub fn trigger(&self) -> &Arc<InvalidationTrigger> {
        &self.trigger
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    /// Whether invalidations are exchanged with other members.
    pub fn is_clustered(&self) -> bool {
        self.consumer.is_some()
    }

    /// Artifact folder shared by every path cache of this runtime.
    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// A self-persisting cache over this runtime's artifact folder. All
    /// caches handed out here share one recursion guard.
    pub fn path_cache<A: PathAggregator>(&self, aggregator: A) -> SelfPersistingCache<A> {
        SelfPersistingCache::with_artifacts(Arc::clone(&self.artifacts), aggregator)
    }
}
