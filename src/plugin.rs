//! Cache plugin boundary
//!
//! Out-of-process cache providers participate through a single RPC
//! operation, `WantsCachedImage`. The transport is not modeled here; the
//! trait is the request/response contract, and the wire structs carry the
//! exact field names of the RPC payload.

use crate::config::BuildConfig;
use crate::error::CacheResult;
use crate::image::ImageId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// RPC operation name a plugin transport registers for
pub const WANTS_CACHED_IMAGE: &str = "ImageCachePlugin.WantsCachedImage";

/// Request payload for `WantsCachedImage`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WantsCachedImageRequest {
    /// The parent image we are looking for a child of; empty for scratch
    #[serde(rename = "ParentImageId", default)]
    pub parent_image_id: String,

    /// ...which must match this config
    #[serde(rename = "ContainerConfig")]
    pub container_config: BuildConfig,
}

impl WantsCachedImageRequest {
    pub fn new(parent: Option<&ImageId>, config: BuildConfig) -> Self {
        Self {
            parent_image_id: parent.map(ToString::to_string).unwrap_or_default(),
            container_config: config,
        }
    }
}

/// Response payload for `WantsCachedImage`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WantsCachedImageResponse {
    /// The image the provider found, or empty if it found none
    #[serde(rename = "ImageId", default)]
    pub image_id: String,

    /// Error message from the provider, if any
    #[serde(rename = "Err", default)]
    pub err: String,
}

impl WantsCachedImageResponse {
    /// An empty image ID or a non-empty error is a miss
    pub fn is_miss(&self) -> bool {
        self.image_id.is_empty() || !self.err.is_empty()
    }
}

/// A registered out-of-process cache provider.
///
/// The provider is responsible for pulling any image it reports into the
/// local store; the resolver re-verifies store membership before trusting
/// a returned ID.
#[async_trait]
pub trait CachePlugin: Send + Sync {
    /// Registered plugin name, used in logs
    fn name(&self) -> &str;

    /// Ask the provider for a cached child of the request's parent
    async fn wants_cached_image(
        &self,
        request: &WantsCachedImageRequest,
    ) -> CacheResult<WantsCachedImageResponse>;
}
