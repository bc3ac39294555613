//! In-memory image store
//!
//! Backs tests and embedders that already hold their images in memory.
//! Parent/child relationships are an index keyed by ID, matching how the
//! persistent stores expose them.

use crate::error::{CacheError, CacheResult};
use crate::image::{Image, ImageId};
use crate::store::{ImageStore, ReferenceStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory [`ImageStore`] and [`ReferenceStore`]
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    images: HashMap<ImageId, Image>,
    children: HashMap<ImageId, Vec<ImageId>>,
    references: HashMap<String, ImageId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image; its parent link updates the children index
    pub fn insert(&self, image: Image) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if let Some(parent) = &image.parent {
            inner
                .children
                .entry(parent.clone())
                .or_default()
                .push(image.id.clone());
        }
        inner.images.insert(image.id.clone(), image);
    }

    /// Point a name/tag at an image ID
    pub fn tag(&self, reference: impl Into<String>, id: ImageId) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.references.insert(reference.into(), id);
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn get(&self, id: &ImageId) -> CacheResult<Image> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .images
            .get(id)
            .cloned()
            .ok_or_else(|| CacheError::image_not_found(id.as_str()))
    }

    async fn search(&self, key: &str) -> CacheResult<ImageId> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut matches = inner
            .images
            .keys()
            .filter(|id| id.as_str().starts_with(key))
            .cloned();

        let first = matches.next().ok_or_else(|| CacheError::image_not_found(key))?;
        if matches.next().is_some() {
            return Err(CacheError::store(format!("ambiguous image search: {key}")));
        }
        Ok(first)
    }

    async fn children(&self, id: &ImageId) -> Vec<ImageId> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.children.get(id).cloned().unwrap_or_default()
    }

    async fn map(&self) -> HashMap<ImageId, Image> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.images.clone()
    }
}

#[async_trait]
impl ReferenceStore for MemoryStore {
    async fn get(&self, reference: &str) -> CacheResult<ImageId> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .references
            .get(reference)
            .cloned()
            .ok_or_else(|| CacheError::image_not_found(reference))
    }

    async fn references(&self, id: &ImageId) -> Vec<String> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut refs: Vec<String> = inner
            .references
            .iter()
            .filter(|(_, mapped)| *mapped == id)
            .map(|(reference, _)| reference.clone())
            .collect();
        refs.sort();
        refs
    }
}
