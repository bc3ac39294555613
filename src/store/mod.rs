//! Image and reference store boundaries
//!
//! Storage is a collaborator: the resolver reads images through these
//! traits and never writes. [`memory::MemoryStore`] is the in-process
//! implementation used by embedders and tests.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::{CacheError, CacheResult};
use crate::image::{Image, ImageId};
use async_trait::async_trait;
use std::collections::HashMap;

/// Read-only image lookups
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Fetch an image by ID
    async fn get(&self, id: &ImageId) -> CacheResult<Image>;

    /// Resolve a search key (e.g. an ID prefix) to an image ID
    async fn search(&self, key: &str) -> CacheResult<ImageId>;

    /// IDs of the images whose parent is `id`
    async fn children(&self, id: &ImageId) -> Vec<ImageId>;

    /// Snapshot of every image in the store
    async fn map(&self) -> HashMap<ImageId, Image>;
}

/// Name/tag to image ID lookups
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Resolve a reference to an image ID
    async fn get(&self, reference: &str) -> CacheResult<ImageId>;

    /// All references naming `id`
    async fn references(&self, id: &ImageId) -> Vec<String>;
}

/// Resolve a name, tag, or ID to an image.
///
/// Tries, in order: a literal image ID, the reference store, and an
/// image-store search. A miss yields [`CacheError::ImageNotFound`]
/// carrying the reference as given.
pub async fn lookup_image(
    images: &dyn ImageStore,
    refs: &dyn ReferenceStore,
    reference: &str,
) -> CacheResult<Image> {
    let literal = ImageId::new(reference);
    if let Ok(image) = images.get(&literal).await {
        return Ok(image);
    }

    if let Ok(id) = refs.get(reference).await {
        return images.get(&id).await;
    }

    if let Ok(id) = images.search(reference).await {
        return images.get(&id).await;
    }

    Err(CacheError::image_not_found(reference))
}
