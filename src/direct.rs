//! Direct parent/config matching
//!
//! Finds a local image that is a direct child of the queried parent and
//! was built with an equal configuration. Direct lineage always beats
//! cache-from matching, so the resolver consults this first.

use crate::config::{BuildConfig, ConfigComparator};
use crate::error::{CacheError, CacheResult};
use crate::image::{Image, ImageId};
use crate::store::ImageStore;
use std::sync::Arc;
use tracing::debug;

pub struct DirectMatcher {
    store: Arc<dyn ImageStore>,
    comparator: Arc<dyn ConfigComparator>,
}

impl DirectMatcher {
    pub fn new(store: Arc<dyn ImageStore>, comparator: Arc<dyn ConfigComparator>) -> Self {
        Self { store, comparator }
    }

    /// Most recently created child of `parent` whose build configuration
    /// equals `config`.
    ///
    /// `Ok(None)` when nothing matches — a miss is not an error. An error
    /// is returned only when the store index lists a child it cannot
    /// return. Equal creation times resolve to the lexicographically
    /// smallest image ID.
    pub async fn get_cached_image(
        &self,
        parent: Option<&ImageId>,
        config: &BuildConfig,
    ) -> CacheResult<Option<Image>> {
        let siblings = match parent {
            Some(id) => self.store.children(id).await,
            // scratch is not an actual image; candidates are all
            // parentless images in the store
            None => {
                let mut ids: Vec<ImageId> = self
                    .store
                    .map()
                    .await
                    .into_iter()
                    .filter(|(_, image)| image.parent.is_none())
                    .map(|(id, _)| id)
                    .collect();
                ids.sort();
                ids
            }
        };

        let mut best: Option<Image> = None;
        for id in siblings {
            let image = self.store.get(&id).await.map_err(|e| {
                CacheError::InconsistentIndex {
                    child: id.clone(),
                    parent: parent.map_or_else(|| "scratch".to_string(), |p| p.to_string()),
                    reason: e.to_string(),
                }
            })?;

            if !self.comparator.equal(&image.config, config) {
                continue;
            }

            let wins = match &best {
                None => true,
                Some(current) => {
                    image.created_at > current.created_at
                        || (image.created_at == current.created_at && image.id < current.id)
                }
            };
            if wins {
                best = Some(image);
            }
        }

        if let Some(hit) = &best {
            debug!(image = %hit.id, "direct cache match");
        }
        Ok(best)
    }
}
