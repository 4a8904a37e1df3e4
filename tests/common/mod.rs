#![allow(dead_code)]

use std::sync::Arc;

use treecache::application::repos::{NodeStore, ensure_folder};
use treecache::domain::nodes::{Node, SETTINGS_TYPE};
use treecache::domain::paths;
use treecache::infra::memory::MemoryNodeStore;

/// Store with `/Root` and one node per `(path, node_type, body)`; missing
/// ancestors become folders.
pub async fn store_with(nodes: &[(&str, &str, Option<&str>)]) -> Arc<MemoryNodeStore> {
    let store = MemoryNodeStore::with_root("/Root").expect("root");
    for (path, node_type, body) in nodes {
        put(&store, path, node_type, *body).await;
    }
    Arc::new(store)
}

pub async fn put(store: &MemoryNodeStore, path: &str, node_type: &str, body: Option<&str>) -> Node {
    if let Some(parent) = paths::parent(path) {
        ensure_folder(store, parent).await.expect("parent folders");
    }
    let mut node = Node::new(path, node_type).expect("node");
    if let Some(body) = body {
        node = node.with_body(body);
    }
    store.save(&node).await.expect("save node");
    node
}

pub fn settings(
    path: &'static str,
    body: &'static str,
) -> (&'static str, &'static str, Option<&'static str>) {
    (path, SETTINGS_TYPE, Some(body))
}
