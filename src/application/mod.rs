//! Application services built on the cache layer.

pub mod artifacts;
pub mod error;
pub mod repos;
pub mod runtime;
pub mod settings;
