//! Error types for layercache
//!
//! All modules use `CacheResult<T>` as their return type.

use crate::image::ImageId;
use thiserror::Error;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur during cache resolution
#[derive(Error, Debug)]
pub enum CacheError {
    /// No image exists for the given reference or ID
    #[error("no such image: {0}")]
    ImageNotFound(String),

    /// An image's history and layer list disagree; its cache data cannot
    /// be trusted and the build must not continue as though it could.
    #[error(
        "corrupt history for image {id}: {producing} layer-producing entries but {layers} layers"
    )]
    CorruptHistory {
        id: ImageId,
        producing: usize,
        layers: usize,
    },

    /// The store's parent/child index lists an image it cannot return
    #[error("inconsistent image index: child {child} of {parent}: {reason}")]
    InconsistentIndex {
        child: ImageId,
        parent: String,
        reason: String,
    },

    /// A backing image store failed
    #[error("image store error: {0}")]
    Store(String),

    /// A cache plugin reported a failure
    #[error("cache plugin {name}: {reason}")]
    Plugin { name: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    /// Create an image-not-found error from any reference form
    pub fn image_not_found(reference: impl Into<String>) -> Self {
        Self::ImageNotFound(reference.into())
    }

    /// Create a store error with context
    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store(reason.into())
    }

    /// Create a plugin error
    pub fn plugin(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Plugin {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
