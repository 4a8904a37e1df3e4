//! Hierarchical configuration-resolution cache.
//!
//! Items of a tracked kind are indexed by store path into immutable
//! snapshots. Lookups walk from a context path towards the root and return
//! the nearest match. Saves invalidate the local snapshot at once and every
//! other cluster member through a [`cache::ClusterBroadcaster`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
