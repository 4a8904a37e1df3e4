//! Hierarchical tree caches and their cluster invalidation.
//!
//! - [`TreeCache`]: lazily built, immutable snapshots of one tracked kind
//!   with nearest-ancestor lookup
//! - [`CacheContext`]: registry of the caches of one process
//! - [`InvalidationTrigger`] / [`InvalidationConsumer`]: send and apply
//!   invalidations over a [`ClusterBroadcaster`]
//!
//! ## Configuration
//!
//! Store layout conventions are read from `treecache.toml`:
//!
//! ```toml
//! [cache]
//! root_path = "/Root"
//! settings_folder = "Settings"
//! enable_broadcast = true
//! # ... see config.rs for all options
//! ```

mod cluster;
mod config;
mod consumer;
mod index;
mod lock;
mod messages;
mod registry;
mod snapshot;
mod tree;
mod trigger;

pub use cluster::{ClusterBroadcaster, ClusterError, MessageHandler};
pub use config::CacheConfig;
pub use consumer::InvalidationConsumer;
pub use index::{PathIndex, TreeCacheEntry};
pub use messages::{ClusterMessage, INVALIDATE_ALL_TYPE, MemberId, MessageKind, invalidate_type};
pub use registry::{CacheContext, RegistryError};
pub use snapshot::TreeCacheSnapshot;
pub use tree::{CacheHandle, InstanceChangedHook, TreeCache};
pub use trigger::InvalidationTrigger;

pub(crate) use lock::{mutex_lock, rw_read, rw_write};

