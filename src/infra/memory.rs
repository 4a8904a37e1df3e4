//! In-process [`NodeStore`] used by the inspection binary and the test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::application::repos::{NodeStore, StoreError};
use crate::domain::nodes::{Node, NodeId};
use crate::domain::paths;

#[derive(Default)]
struct Nodes {
    by_id: HashMap<NodeId, Node>,
    by_path: HashMap<String, NodeId>,
    trash: Vec<Node>,
}

/// Map-backed node store.
///
/// Every trait call is counted so tests can assert on store traffic, and
/// writes can be made to fail on demand.
#[derive(Default)]
pub struct MemoryNodeStore {
    nodes: RwLock<Nodes>,
    calls: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a single root folder.
    pub fn with_root(root: &str) -> Result<Self, StoreError> {
        let node = Node::folder(root)?;
        let mut nodes = Nodes::default();
        nodes.by_path.insert(paths::lookup_key(&node.path), node.id);
        nodes.by_id.insert(node.id, node);
        Ok(Self {
            nodes: RwLock::new(nodes),
            ..Self::default()
        })
    }

    /// Number of trait calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make `save` and `delete` fail with a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Nodes removed with `permanent == false`.
    pub async fn trashed(&self) -> Vec<Node> {
        self.nodes.read().await.trash.clone()
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_writable(&self, op: &'static str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence(format!("{op} rejected: store is read-only")));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn load_by_path(&self, path: &str) -> Result<Option<Node>, StoreError> {
        self.record_call();
        let nodes = self.nodes.read().await;
        Ok(nodes
            .by_path
            .get(&paths::lookup_key(path))
            .and_then(|id| nodes.by_id.get(id))
            .cloned())
    }

    async fn load_by_id(&self, id: NodeId) -> Result<Node, StoreError> {
        self.record_call();
        self.nodes
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn save(&self, node: &Node) -> Result<(), StoreError> {
        self.record_call();
        self.check_writable("save")?;

        let path = paths::normalize(&node.path)?;
        let key = paths::lookup_key(&path);
        let mut nodes = self.nodes.write().await;

        let parent_missing = paths::parent(&path)
            .is_some_and(|parent| !nodes.by_path.contains_key(&paths::lookup_key(parent)));
        if parent_missing {
            return Err(StoreError::MissingParent { path });
        }

        if nodes.by_path.get(&key).is_some_and(|existing| *existing != node.id) {
            return Err(StoreError::Duplicate { path });
        }

        if let Some(previous) = nodes.by_id.get(&node.id) {
            if paths::lookup_key(&previous.path) != key {
                return Err(StoreError::Persistence(format!(
                    "moving `{}` to `{path}` is not supported",
                    previous.path
                )));
            }
        }

        let mut stored = node.clone();
        stored.path = path;
        nodes.by_path.insert(key, stored.id);
        nodes.by_id.insert(stored.id, stored);
        debug!(node_id = %node.id, path = %node.path, "Node saved");
        Ok(())
    }

    async fn delete(&self, node: &Node, permanent: bool) -> Result<(), StoreError> {
        self.record_call();
        self.check_writable("delete")?;

        let mut nodes = self.nodes.write().await;
        let Some(target) = nodes.by_id.get(&node.id).cloned() else {
            return Ok(());
        };

        let doomed: Vec<NodeId> = nodes
            .by_id
            .values()
            .filter(|candidate| {
                candidate.id == target.id || paths::is_descendant_of(&candidate.path, &target.path)
            })
            .map(|candidate| candidate.id)
            .collect();

        for id in doomed {
            if let Some(removed) = nodes.by_id.remove(&id) {
                nodes.by_path.remove(&paths::lookup_key(&removed.path));
                if !permanent {
                    nodes.trash.push(removed);
                }
            }
        }
        debug!(node_id = %node.id, path = %target.path, permanent, "Node deleted");
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        self.record_call();
        Ok(self
            .nodes
            .read()
            .await
            .by_path
            .contains_key(&paths::lookup_key(path)))
    }

    async fn query_descendants_by_type_and_name(
        &self,
        node_type: &str,
        name_pattern: &str,
    ) -> Result<Vec<Node>, StoreError> {
        self.record_call();
        let nodes = self.nodes.read().await;
        let mut matches: Vec<Node> = nodes
            .by_id
            .values()
            .filter(|node| node.is_type(node_type) && matches_pattern(node.name(), name_pattern))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(matches)
    }
}

/// Case-insensitive glob match where `*` matches any run of characters.
fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if p < pattern.len() && pattern[p] == name[n] {
            p += 1;
            n += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::nodes::SETTINGS_TYPE;

    async fn seeded() -> MemoryNodeStore {
        let store = MemoryNodeStore::with_root("/Root").expect("root");
        store
            .save(&Node::folder("/Root/Site").expect("folder"))
            .await
            .expect("save site");
        store
    }

    #[test]
    fn pattern_matching() {
        assert!(matches_pattern("logging.settings", "*.settings"));
        assert!(matches_pattern("Logging.Settings", "logging.*"));
        assert!(matches_pattern("anything", "*"));
        assert!(matches_pattern("exact", "exact"));
        assert!(matches_pattern("a-b-c", "a*c"));
        assert!(!matches_pattern("logging.json", "*.settings"));
        assert!(!matches_pattern("exactly", "exact"));
    }

    #[tokio::test]
    async fn save_and_load() {
        let store = seeded().await;
        let node = store
            .load_by_path("/root/site")
            .await
            .expect("load")
            .expect("site exists");
        assert_eq!(node.path, "/Root/Site");

        let by_id = store.load_by_id(node.id).await.expect("load by id");
        assert_eq!(by_id, node);
        assert!(store.exists("/Root/Site").await.expect("exists"));
        assert!(store.load_by_path("/Root/Missing").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn save_requires_parent() {
        let store = seeded().await;
        let orphan = Node::folder("/Root/Nowhere/Child").expect("folder");
        let err = store.save(&orphan).await.expect_err("missing parent");
        assert!(matches!(err, StoreError::MissingParent { .. }));
    }

    #[tokio::test]
    async fn save_rejects_duplicate_path() {
        let store = seeded().await;
        let twin = Node::folder("/Root/SITE").expect("folder");
        let err = store.save(&twin).await.expect_err("duplicate path");
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn delete_removes_subtree() {
        let store = seeded().await;
        let settings = Node::folder("/Root/Site/Settings").expect("folder");
        store.save(&settings).await.expect("save");
        let site = store
            .load_by_path("/Root/Site")
            .await
            .expect("load")
            .expect("site");

        store.delete(&site, false).await.expect("delete");

        assert!(!store.exists("/Root/Site/Settings").await.expect("exists"));
        assert_eq!(store.trashed().await.len(), 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn query_filters_by_type_and_name() {
        let store = seeded().await;
        store
            .save(&Node::folder("/Root/Site/Settings").expect("folder"))
            .await
            .expect("save");
        store
            .save(&Node::new("/Root/Site/Settings/logging.settings", SETTINGS_TYPE).expect("node"))
            .await
            .expect("save");

        let found = store
            .query_descendants_by_type_and_name(SETTINGS_TYPE, "*.settings")
            .await
            .expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "logging.settings");

        let none = store
            .query_descendants_by_type_and_name("Folder", "*.settings")
            .await
            .expect("query");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn failing_writes_leave_store_untouched() {
        let store = seeded().await;
        store.set_fail_writes(true);
        let err = store
            .save(&Node::folder("/Root/Other").expect("folder"))
            .await
            .expect_err("writes fail");
        assert!(matches!(err, StoreError::Persistence(_)));
        assert!(!store.exists("/Root/Other").await.expect("exists"));
    }
}
