//! Store nodes as seen by the caches.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;
use super::paths;

/// Node type of plain container nodes.
pub const FOLDER_TYPE: &str = "Folder";
/// Node type of settings files.
pub const SETTINGS_TYPE: &str = "Settings";
/// Node type of self-persisting cache artifacts.
pub const ARTIFACT_TYPE: &str = "CacheArtifact";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A content item addressed both by identity and by path.
///
/// `body` holds the item's text payload (JSON for settings and artifacts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub path: String,
    pub node_type: String,
    pub body: Option<String>,
    pub modified_at: OffsetDateTime,
}

impl Node {
    /// Build a new node at `path` with a fresh identity.
    pub fn new(path: &str, node_type: impl Into<String>) -> Result<Self, DomainError> {
        let path = paths::normalize(path)?;
        let node_type = node_type.into();
        if node_type.trim().is_empty() {
            return Err(DomainError::validation("node type must not be empty"));
        }
        Ok(Self {
            id: NodeId::new(),
            path,
            node_type,
            body: None,
            modified_at: OffsetDateTime::now_utc(),
        })
    }

    pub fn folder(path: &str) -> Result<Self, DomainError> {
        Self::new(path, FOLDER_TYPE)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn name(&self) -> &str {
        paths::name(&self.path)
    }

    pub fn parent_path(&self) -> Option<&str> {
        paths::parent(&self.path)
    }

    /// Replace the body and bump the modification timestamp.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
        self.modified_at = OffsetDateTime::now_utc();
    }

    pub fn is_type(&self, node_type: &str) -> bool {
        self.node_type.eq_ignore_ascii_case(node_type)
    }
}
