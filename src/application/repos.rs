//! Repository traits describing persistence adapters.
//!
//! The caches only ever talk to content storage through [`NodeStore`]. The
//! persistence engine itself lives elsewhere; `infra::memory` provides an
//! in-process implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::error::DomainError;
use crate::domain::nodes::{Node, NodeId};
use crate::domain::paths;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("node `{id}` not found")]
    NotFound { id: NodeId },
    #[error("a different node already exists at `{path}`")]
    Duplicate { path: String },
    #[error("parent of `{path}` does not exist")]
    MissingParent { path: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Narrow view of the content store.
///
/// Absence is never an error for path lookups and queries: `load_by_path`
/// returns `None` and queries return an empty vector. `load_by_id` is used
/// for identities obtained from the store itself and reports
/// [`StoreError::NotFound`] when the node has vanished in between.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn load_by_path(&self, path: &str) -> Result<Option<Node>, StoreError>;

    async fn load_by_id(&self, id: NodeId) -> Result<Node, StoreError>;

    /// Insert or update a node, keyed by identity.
    async fn save(&self, node: &Node) -> Result<(), StoreError>;

    /// Delete a node. `permanent == false` asks for a recoverable delete;
    /// stores without a trash may treat both the same way.
    async fn delete(&self, node: &Node, permanent: bool) -> Result<(), StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// All nodes of `node_type` whose name matches `name_pattern`
    /// (`*` wildcard, case-insensitive), anywhere in the store.
    async fn query_descendants_by_type_and_name(
        &self,
        node_type: &str,
        name_pattern: &str,
    ) -> Result<Vec<Node>, StoreError>;
}

/// Create `path` and any missing ancestors as folders.
pub async fn ensure_folder(store: &dyn NodeStore, path: &str) -> Result<(), StoreError> {
    let path = paths::normalize(path)?;
    let mut missing = Vec::new();
    let mut current = Some(path.as_str());
    while let Some(candidate) = current {
        if store.exists(candidate).await? {
            break;
        }
        missing.push(candidate);
        current = paths::parent(candidate);
    }

    for folder in missing.into_iter().rev() {
        match store.save(&Node::folder(folder)?).await {
            Ok(()) | Err(StoreError::Duplicate { .. }) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
