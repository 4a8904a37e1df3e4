//! Effective settings resolution.
//!
//! Settings files live in a reserved `Settings` folder of any scope, e.g.
//! `/Root/Site/Settings/logging.settings`. The file closest to a context path
//! wins; the root scope is only consulted through [`SettingsResolutionCache::resolve_root`].

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{NodeStore, StoreError, ensure_folder};
use crate::cache::{
    CacheConfig, CacheContext, InvalidationTrigger, PathIndex, RegistryError, TreeCache,
    TreeCacheEntry, mutex_lock,
};
use crate::domain::nodes::{Node, NodeId, SETTINGS_TYPE};
use crate::domain::paths;

const SOURCE: &str = "application::settings";

pub const SETTINGS_CACHE_KIND: &str = "settings";

/// Index of every settings file stored in a reserved settings folder.
pub struct SettingsIndex {
    store: Arc<dyn NodeStore>,
    config: CacheConfig,
}

impl SettingsIndex {
    pub fn new(store: Arc<dyn NodeStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    fn in_settings_folder(&self, node: &Node) -> bool {
        node.parent_path()
            .map(paths::name)
            .is_some_and(|folder| folder.eq_ignore_ascii_case(&self.config.settings_folder))
    }
}

#[async_trait]
impl PathIndex for SettingsIndex {
    type Payload = OffsetDateTime;

    fn kind(&self) -> &'static str {
        SETTINGS_CACHE_KIND
    }

    async fn load(&self) -> Result<Vec<TreeCacheEntry<OffsetDateTime>>, StoreError> {
        let pattern = format!("*{}", self.config.settings_extension);
        let nodes = self
            .store
            .query_descendants_by_type_and_name(SETTINGS_TYPE, &pattern)
            .await?;

        Ok(nodes
            .into_iter()
            .filter(|node| self.in_settings_folder(node))
            .map(|node| TreeCacheEntry {
                path: node.path,
                id: node.id,
                payload: node.modified_at,
            })
            .collect())
    }
}

/// A resolved settings file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub id: NodeId,
    pub path: String,
    pub name: String,
    pub data: Value,
    pub modified_at: OffsetDateTime,
}

impl Settings {
    /// Parse a settings node. A missing or blank body is an empty object; a
    /// body that is not JSON becomes `null`.
    pub fn from_node(node: &Node) -> Self {
        let data = match node.body.as_deref().map(str::trim) {
            None | Some("") => Value::Object(Default::default()),
            Some(body) => serde_json::from_str(body).unwrap_or_else(|err| {
                warn!(
                    node_id = %node.id,
                    path = %node.path,
                    error = %err,
                    "Settings body is not valid JSON"
                );
                Value::Null
            }),
        };
        let name = node.name();
        let name = name.rsplit_once('.').map_or(name, |(stem, _)| stem);

        Self {
            id: node.id,
            path: node.path.clone(),
            name: name.to_string(),
            data,
            modified_at: node.modified_at,
        }
    }

    /// Typed value at `key`; dots descend into nested objects.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = key
            .split('.')
            .try_fold(&self.data, |current, segment| current.get(segment))?;
        serde_json::from_value(value.clone()).ok()
    }
}

/// Resolves the effective settings object for a context path.
pub struct SettingsResolutionCache {
    store: Arc<dyn NodeStore>,
    config: CacheConfig,
    cache: Arc<TreeCache<SettingsIndex>>,
    trigger: Option<Arc<InvalidationTrigger>>,
    memo: Arc<Mutex<LruCache<NodeId, Arc<Settings>>>>,
}

impl SettingsResolutionCache {
    pub fn new(
        context: &CacheContext,
        store: Arc<dyn NodeStore>,
        config: CacheConfig,
        trigger: Option<Arc<InvalidationTrigger>>,
    ) -> Result<Self, RegistryError> {
        let cache = context.register(SettingsIndex::new(store.clone(), config.clone()))?;
        let memo = Arc::new(Mutex::new(LruCache::new(
            config.settings_memo_limit_non_zero(),
        )));

        let hook_memo = Arc::clone(&memo);
        cache.on_instance_changed(move |_| {
            mutex_lock(&hook_memo, SOURCE, "instance_changed").clear();
        });
        if let Some(trigger) = &trigger {
            trigger.track(&cache);
        }

        Ok(Self {
            store,
            config,
            cache,
            trigger,
            memo,
        })
    }

    pub fn tree_cache(&self) -> &Arc<TreeCache<SettingsIndex>> {
        &self.cache
    }

    /// Settings named `settings_name` nearest to `context_path`.
    ///
    /// `None` means "use the built-in default". The root path never matches;
    /// see [`Self::resolve_root`].
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        settings_name: &str,
        context_path: &str,
    ) -> Result<Option<Arc<Settings>>, StoreError> {
        if self.config.is_root(context_path) {
            debug!("Root context path is not part of the ancestor walk");
            return Ok(None);
        }

        let file_name = self.config.settings_file_name(settings_name);
        let generation = self.cache.generation();
        let entry = self
            .cache
            .find_nearest_item(context_path, &self.config.root_path, |ancestor| {
                self.config.settings_path(ancestor, &file_name)
            })
            .await?;

        match entry {
            Some(entry) => self.load_settings(entry.id, generation).await,
            None => {
                debug!("No settings found, caller falls back to defaults");
                Ok(None)
            }
        }
    }

    /// Settings named `settings_name` stored directly under the root scope.
    #[instrument(skip(self))]
    pub async fn resolve_root(
        &self,
        settings_name: &str,
    ) -> Result<Option<Arc<Settings>>, StoreError> {
        let path = self.config.settings_path(
            &self.config.root_path,
            &self.config.settings_file_name(settings_name),
        );
        Ok(self
            .store
            .load_by_path(&path)
            .await?
            .map(|node| Arc::new(Settings::from_node(&node))))
    }

    /// Typed value `key` of the nearest settings, falling back to the root
    /// settings and then to `default`.
    pub async fn get_value<T: DeserializeOwned>(
        &self,
        settings_name: &str,
        key: &str,
        context_path: &str,
        default: T,
    ) -> Result<T, StoreError> {
        if let Some(value) = self
            .resolve(settings_name, context_path)
            .await?
            .and_then(|settings| settings.get(key))
        {
            return Ok(value);
        }

        Ok(self
            .resolve_root(settings_name)
            .await?
            .and_then(|settings| settings.get(key))
            .unwrap_or(default))
    }

    /// Create or replace the settings `settings_name` in `scope_path`.
    ///
    /// The local cache is invalidated before this returns; other members are
    /// notified in the background.
    #[instrument(skip(self, data))]
    pub async fn save(
        &self,
        scope_path: &str,
        settings_name: &str,
        data: &Value,
    ) -> Result<Settings, StoreError> {
        let body = serde_json::to_string_pretty(data).map_err(StoreError::from_persistence)?;
        let path = self
            .config
            .settings_path(scope_path, &self.config.settings_file_name(settings_name));

        let node = match self.store.load_by_path(&path).await? {
            Some(mut existing) => {
                existing.set_body(body);
                existing
            }
            None => {
                if let Some(folder) = paths::parent(&path) {
                    ensure_folder(self.store.as_ref(), folder).await?;
                }
                Node::new(&path, SETTINGS_TYPE)?.with_body(body)
            }
        };
        self.store.save(&node).await?;

        match &self.trigger {
            Some(trigger) => {
                trigger.item_changed(SETTINGS_CACHE_KIND, &node);
            }
            None => {
                self.cache.invalidate();
            }
        }
        info!(node_id = %node.id, path = %node.path, "Settings saved");
        Ok(Settings::from_node(&node))
    }

    /// Drop the cached settings index.
    pub fn invalidate(&self) -> bool {
        self.cache.invalidate()
    }

    async fn load_settings(
        &self,
        id: NodeId,
        generation: u64,
    ) -> Result<Option<Arc<Settings>>, StoreError> {
        let memoized = mutex_lock(&self.memo, SOURCE, "get").get(&id).cloned();
        if memoized.is_some() {
            return Ok(memoized);
        }

        let node = match self.store.load_by_id(id).await {
            Ok(node) => node,
            Err(StoreError::NotFound { .. }) => {
                warn!(node_id = %id, "Indexed settings vanished from the store");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let settings = Arc::new(Settings::from_node(&node));

        // Checked under the memo lock: invalidation bumps the generation
        // before its hook clears the memo under the same lock.
        {
            let mut memo = mutex_lock(&self.memo, SOURCE, "put");
            if self.cache.generation() == generation {
                memo.put(id, Arc::clone(&settings));
            }
        }
        Ok(Some(settings))
    }
}
