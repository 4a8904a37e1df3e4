//! Self-persisting path caches.
//!
//! A [`SelfPersistingCache`] stores its computed path list as an artifact node
//! in the same store the list is computed from. Computing and persisting are
//! store writes themselves, so while either is in flight [`SelfPersistingCache::get_paths`]
//! answers with an empty list instead of recursing. The guard belongs to the
//! [`ArtifactStore`], so caches sharing one also share the guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{NodeStore, StoreError, ensure_folder};
use crate::cache::CacheConfig;
use crate::domain::nodes::{ARTIFACT_TYPE, Node, NodeId};
use crate::domain::paths;

const METRIC_ARTIFACT_COMPUTE_TOTAL: &str = "treecache_artifact_compute_total";
const METRIC_GUARD_SHORT_CIRCUIT_TOTAL: &str = "treecache_guard_short_circuit_total";

/// Computes the path list persisted for one key.
#[async_trait]
pub trait PathAggregator: Send + Sync {
    async fn aggregate(&self, store: &dyn NodeStore, key: &str) -> Result<Vec<String>, StoreError>;
}

/// Paths of every node of one type whose name matches the key pattern.
#[derive(Debug, Clone)]
pub struct DescendantPaths {
    node_type: String,
}

impl DescendantPaths {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
        }
    }
}

#[async_trait]
impl PathAggregator for DescendantPaths {
    async fn aggregate(&self, store: &dyn NodeStore, key: &str) -> Result<Vec<String>, StoreError> {
        let mut found: Vec<String> = store
            .query_descendants_by_type_and_name(&self.node_type, key)
            .await?
            .into_iter()
            .map(|node| node.path)
            .collect();
        found.sort();
        found.dedup();
        Ok(found)
    }
}

/// Marks a compute or delete cycle as in flight until dropped.
struct RecursionGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> RecursionGuard<'a> {
    fn enter(in_flight: &'a AtomicUsize) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for RecursionGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Artifact folder shared by self-persisting caches.
///
/// Owns the recursion guard: while any cache over this folder computes,
/// persists or deletes an artifact, every cache over it short-circuits.
pub struct ArtifactStore {
    store: Arc<dyn NodeStore>,
    config: CacheConfig,
    in_flight: AtomicUsize,
}

impl ArtifactStore {
    pub fn new(store: Arc<dyn NodeStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Whether a compute or delete cycle is running.
    pub fn is_guarded(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Store path of the artifact for `key`.
    pub fn artifact_path(&self, key: &str) -> String {
        let file_name = format!("{}{}", sanitize_key(key), self.config.artifact_extension);
        paths::join(&self.config.artifact_folder, &file_name)
    }

    /// Permanently delete the artifact for `key`. Missing artifacts are a
    /// no-op; returns whether one was deleted.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.enter();
        let path = self.artifact_path(key);

        match self.store.load_by_path(&path).await? {
            Some(artifact) => {
                self.store.delete(&artifact, true).await?;
                info!(artifact = %path, "Cache artifact deleted");
                Ok(true)
            }
            None => {
                debug!(artifact = %path, "No cache artifact to delete");
                Ok(false)
            }
        }
    }

    fn enter(&self) -> RecursionGuard<'_> {
        RecursionGuard::enter(&self.in_flight)
    }

    async fn persist(&self, path: &str, found: &[String]) -> Result<NodeId, StoreError> {
        ensure_folder(self.store.as_ref(), &self.config.artifact_folder).await?;

        let body = serde_json::to_string(found).map_err(StoreError::from_persistence)?;
        let node = Node::new(path, ARTIFACT_TYPE)?.with_body(body);
        match self.store.save(&node).await {
            Ok(()) => Ok(node.id),
            // Another process persisted the same key first; theirs is equivalent.
            Err(StoreError::Duplicate { .. }) => match self.store.load_by_path(path).await? {
                Some(existing) => {
                    debug!(artifact = %path, "Artifact created concurrently, keeping existing");
                    Ok(existing.id)
                }
                None => Err(StoreError::Duplicate {
                    path: path.to_string(),
                }),
            },
            Err(err) => Err(err),
        }
    }
}

/// One aggregation whose results persist as artifacts.
pub struct SelfPersistingCache<A> {
    artifacts: Arc<ArtifactStore>,
    aggregator: A,
}

impl<A: PathAggregator> SelfPersistingCache<A> {
    /// A cache with an artifact folder, and guard, of its own.
    pub fn new(store: Arc<dyn NodeStore>, aggregator: A, config: CacheConfig) -> Self {
        Self::with_artifacts(Arc::new(ArtifactStore::new(store, config)), aggregator)
    }

    /// A cache sharing `artifacts`, and its guard, with other caches.
    pub fn with_artifacts(artifacts: Arc<ArtifactStore>, aggregator: A) -> Self {
        Self {
            artifacts,
            aggregator,
        }
    }

    pub fn is_guarded(&self) -> bool {
        self.artifacts.is_guarded()
    }

    pub fn artifact_path(&self, key: &str) -> String {
        self.artifacts.artifact_path(key)
    }

    /// The persisted path list for `key`, computing it on first use.
    ///
    /// Returns an empty list without touching the store while a cycle is in
    /// flight; callers treat that as "not computed yet".
    pub async fn get_paths(&self, key: &str) -> Result<Vec<String>, StoreError> {
        if self.is_guarded() {
            counter!(METRIC_GUARD_SHORT_CIRCUIT_TOTAL).increment(1);
            debug!(cache_key = key, "Recursion guard set, returning empty paths");
            return Ok(Vec::new());
        }
        self.load_or_create(key).await
    }

    /// Load the artifact for `key`, or compute, persist and reload it.
    ///
    /// When persisting fails the computed list is still returned, but nothing
    /// is cached and the next call computes again.
    #[instrument(skip(self), fields(artifact = tracing::field::Empty))]
    pub async fn load_or_create(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let artifacts = self.artifacts.as_ref();
        let store = artifacts.store.as_ref();
        let path = artifacts.artifact_path(key);
        tracing::Span::current().record("artifact", path.as_str());

        if let Some(existing) = store.load_by_path(&path).await? {
            match parse_artifact(&existing) {
                Ok(found) => return Ok(found),
                Err(err) => {
                    warn!(error = %err, "Malformed cache artifact, recomputing");
                    let _guard = artifacts.enter();
                    store.delete(&existing, true).await?;
                }
            }
        }

        let persisted = {
            let _guard = artifacts.enter();
            let computed = self.aggregator.aggregate(store, key).await?;
            counter!(METRIC_ARTIFACT_COMPUTE_TOTAL).increment(1);

            match artifacts.persist(&path, &computed).await {
                Ok(id) => id,
                Err(err) => {
                    warn!(error = %err, "Failed to persist cache artifact, result not cached");
                    return Ok(computed);
                }
            }
        };

        let stored = store.load_by_id(persisted).await?;
        let found = parse_artifact(&stored).map_err(StoreError::from_persistence)?;
        info!(paths = found.len(), "Cache artifact persisted");
        Ok(found)
    }

    /// Permanently delete the artifact for `key`.
    pub async fn invalidate(&self, key: &str) -> Result<bool, StoreError> {
        self.artifacts.invalidate(key).await
    }
}

fn parse_artifact(node: &Node) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(node.body.as_deref().unwrap_or_default())
}

/// Map a cache key onto a single path segment.
///
/// Lowercase ASCII letters, digits, `-`, `_` and `.` pass through; every
/// other byte becomes `~xx`. Store paths compare case-insensitively, so keys
/// differing only in ASCII case share one artifact.
pub fn sanitize_key(key: &str) -> String {
    let mut sanitized = String::with_capacity(key.len());
    for byte in key.to_ascii_lowercase().bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => sanitized.push(byte as char),
            other => sanitized.push_str(&format!("~{other:02x}")),
        }
    }
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        sanitized.insert(0, '~');
    }
    sanitized
}
