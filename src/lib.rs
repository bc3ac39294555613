//! layercache - Layer cache resolution for container image builds
//!
//! Answers, once per build instruction: does any known image already
//! represent the result of running this instruction on this input state?
//! Resolution tries a direct parent/config match against the local image
//! store, then stateful history matching against user-declared cache-from
//! images, then a registered cache plugin.

pub mod config;
pub mod direct;
pub mod error;
pub mod history;
pub mod image;
pub mod plugin;
pub mod resolver;
pub mod store;
pub mod tracker;

pub use error::{CacheError, CacheResult};
pub use resolver::{CacheAnswer, CachedLayer, CacheQuery, CacheResolver, ResolverSettings};
