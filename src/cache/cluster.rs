//! Cluster messaging contract.
//!
//! A [`ClusterBroadcaster`] delivers each sent message to every member,
//! including the sender. Delivery is at-least-once; handlers must tolerate
//! duplicates and reordering.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::messages::{ClusterMessage, MemberId};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("message type `{message_type}` is not registered")]
    UnregisteredType { message_type: String },
    #[error("cluster channel closed")]
    Closed,
    #[error("message codec error: {0}")]
    Codec(String),
}

impl ClusterError {
    pub fn unregistered(message_type: impl Into<String>) -> Self {
        Self::UnregisteredType {
            message_type: message_type.into(),
        }
    }

    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Receiver side of the cluster contract.
pub trait MessageHandler: Send + Sync {
    /// Called once per delivered message of a registered type.
    ///
    /// `is_from_self` is true for the sender's own echo, `is_from_remote` for
    /// messages sent by any other member. Exactly one of the two holds.
    fn handle(&self, message: &ClusterMessage, is_from_self: bool, is_from_remote: bool);
}

#[async_trait]
pub trait ClusterBroadcaster: Send + Sync {
    fn member_id(&self) -> MemberId;

    /// Allow messages of `message_type` to be sent and delivered.
    fn register_message_type(&self, message_type: &str);

    fn is_registered(&self, message_type: &str) -> bool;

    /// Publish `message` to all members.
    async fn send(&self, message: ClusterMessage) -> Result<(), ClusterError>;

    /// Add a handler for every delivered message.
    fn subscribe(&self, handler: Arc<dyn MessageHandler>);
}
