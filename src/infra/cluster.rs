//! In-process cluster transport.
//!
//! [`LocalCluster`] connects any number of [`LocalMember`]s living in one
//! process through a Tokio broadcast channel carrying JSON-encoded messages.
//! It stands in for a real network transport in tests and in the inspection
//! binary while honoring the same contract: every member, the sender
//! included, receives each message of a registered type.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{
    ClusterBroadcaster, ClusterError, ClusterMessage, MemberId, MessageHandler, rw_read, rw_write,
};

const SOURCE: &str = "infra::cluster";

/// Shared channel all members of one in-process cluster talk through.
#[derive(Clone)]
pub struct LocalCluster {
    sender: broadcast::Sender<Arc<str>>,
}

impl LocalCluster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Add a member. Must be called within a Tokio runtime; the member
    /// receives every message sent after this call.
    pub fn join(&self) -> LocalMember {
        let id = Uuid::new_v4();
        let (delivered, _) = watch::channel(0_u64);
        let shared = Arc::new(MemberShared {
            id,
            registered: RwLock::new(HashSet::new()),
            handlers: RwLock::new(Vec::new()),
            delivered,
        });

        let receiver = self.sender.subscribe();
        let task = tokio::spawn(receive_loop(Arc::clone(&shared), receiver));
        debug!(member_id = %id, "Cluster member joined");

        LocalMember {
            sender: self.sender.clone(),
            shared,
            task,
        }
    }

    pub fn member_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

struct MemberShared {
    id: MemberId,
    registered: RwLock<HashSet<String>>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
    delivered: watch::Sender<u64>,
}

impl MemberShared {
    fn is_registered(&self, message_type: &str) -> bool {
        rw_read(&self.registered, SOURCE, "is_registered").contains(message_type)
    }

    fn dispatch(&self, message: &ClusterMessage) {
        let message_type = message.message_type();
        if !self.is_registered(&message_type) {
            debug!(
                member_id = %self.id,
                message_type = %message_type,
                "Ignoring message of unregistered type"
            );
            return;
        }

        let handlers = rw_read(&self.handlers, SOURCE, "dispatch").clone();
        let is_from_self = message.sender == self.id;
        for handler in handlers {
            handler.handle(message, is_from_self, !is_from_self);
        }
    }
}

async fn receive_loop(shared: Arc<MemberShared>, mut receiver: broadcast::Receiver<Arc<str>>) {
    loop {
        match receiver.recv().await {
            Ok(raw) => match ClusterMessage::decode(&raw) {
                Ok(message) => shared.dispatch(&message),
                Err(err) => {
                    warn!(member_id = %shared.id, error = %err, "Dropping undecodable message")
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    member_id = %shared.id,
                    skipped,
                    "Cluster receiver lagged, invalidating all caches"
                );
                shared.dispatch(&ClusterMessage::invalidate_all(shared.id));
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
        shared.delivered.send_modify(|count| *count += 1);
    }
    debug!(member_id = %shared.id, "Cluster receive loop finished");
}

/// One member of a [`LocalCluster`].
pub struct LocalMember {
    sender: broadcast::Sender<Arc<str>>,
    shared: Arc<MemberShared>,
    task: JoinHandle<()>,
}

impl LocalMember {
    /// Number of messages this member has processed so far, ignored ones
    /// included.
    pub fn delivered_count(&self) -> u64 {
        *self.shared.delivered.borrow()
    }

    /// Wait until at least `count` messages have been processed.
    pub async fn delivered(&self, count: u64) {
        let mut receiver = self.shared.delivered.subscribe();
        // The sender lives as long as `self`, so this only ends once reached.
        let _ = receiver.wait_for(|delivered| *delivered >= count).await;
    }
}

impl Drop for LocalMember {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl ClusterBroadcaster for LocalMember {
    fn member_id(&self) -> MemberId {
        self.shared.id
    }

    fn register_message_type(&self, message_type: &str) {
        rw_write(&self.shared.registered, SOURCE, "register_message_type")
            .insert(message_type.to_string());
    }

    fn is_registered(&self, message_type: &str) -> bool {
        self.shared.is_registered(message_type)
    }

    async fn send(&self, message: ClusterMessage) -> Result<(), ClusterError> {
        let message_type = message.message_type();
        if !self.is_registered(&message_type) {
            return Err(ClusterError::unregistered(message_type));
        }

        let raw: Arc<str> = message.encode()?.into();
        self.sender.send(raw).map_err(|_| ClusterError::Closed)?;
        debug!(
            member_id = %self.shared.id,
            message_id = %message.id,
            message_type = %message_type,
            "Cluster message sent"
        );
        Ok(())
    }

    fn subscribe(&self, handler: Arc<dyn MessageHandler>) {
        rw_write(&self.shared.handlers, SOURCE, "subscribe").push(handler);
    }
}
