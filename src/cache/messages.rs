//! Cluster invalidation messages.
//!
//! Messages are JSON-encoded so any transport able to carry text can relay
//! them. Every message carries a unique id and the sending member, which lets
//! receivers tell their own echoes from remote traffic.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::cluster::ClusterError;

/// Identity of one cluster member (process).
pub type MemberId = Uuid;

const INVALIDATE_PREFIX: &str = "invalidate/";
pub const INVALIDATE_ALL_TYPE: &str = "admin/invalidate_all";

/// Message type under which invalidations of `kind` travel.
pub fn invalidate_type(kind: &str) -> String {
    format!("{INVALIDATE_PREFIX}{kind}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MessageKind {
    /// The cache of the named kind must be rebuilt.
    Invalidate { cache: String },
    /// Every registered cache must be rebuilt.
    InvalidateAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMessage {
    pub id: Uuid,
    pub sender: MemberId,
    pub kind: MessageKind,
    pub timestamp: OffsetDateTime,
}

impl ClusterMessage {
    pub fn new(sender: MemberId, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn invalidate(sender: MemberId, cache: impl Into<String>) -> Self {
        Self::new(
            sender,
            MessageKind::Invalidate {
                cache: cache.into(),
            },
        )
    }

    pub fn invalidate_all(sender: MemberId) -> Self {
        Self::new(sender, MessageKind::InvalidateAll)
    }

    /// Registered type this message is routed under.
    pub fn message_type(&self) -> String {
        match &self.kind {
            MessageKind::Invalidate { cache } => invalidate_type(cache),
            MessageKind::InvalidateAll => INVALIDATE_ALL_TYPE.to_string(),
        }
    }

    pub fn encode(&self) -> Result<String, ClusterError> {
        serde_json::to_string(self).map_err(ClusterError::codec)
    }

    pub fn decode(raw: &str) -> Result<Self, ClusterError> {
        serde_json::from_str(raw).map_err(ClusterError::codec)
    }
}
