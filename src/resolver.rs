//! Per-build cache resolution
//!
//! A [`CacheResolver`] is constructed once per build and consulted once
//! per instruction, in order. Resolution tries the direct parent/config
//! match, then fans the instruction out to every open cache-from tracker
//! concurrently, then falls back to the plugin. Cache lookup is
//! best-effort: plugin failures and slow trackers degrade to misses,
//! never build failures.

use crate::config::{extract_command, BuildConfig, ConfigComparator};
use crate::direct::DirectMatcher;
use crate::error::CacheResult;
use crate::history::derive_steps;
use crate::image::{DiffId, ImageId};
use crate::plugin::{CachePlugin, WantsCachedImageRequest};
use crate::store::{lookup_image, ImageStore, ReferenceStore};
use crate::tracker::{TrackerCore, TrackerHandle, TrackerHit};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Timeouts for one resolver; embeddable in a daemon's own configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// How long to wait for tracker answers on each instruction
    pub step_timeout: Duration,

    /// How long a plugin may take before its answer is discarded
    pub plugin_timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(5),
            plugin_timeout: Duration::from_secs(30),
        }
    }
}

/// One instruction's cache question
#[derive(Debug, Clone)]
pub struct CacheQuery {
    /// Image the instruction runs on; `None` for scratch
    pub parent: Option<ImageId>,

    /// Configuration the instruction would commit
    pub config: BuildConfig,

    /// The build's own confirmed layer chain so far
    pub preceding_layers: Vec<DiffId>,
}

/// A layer reused from a cache-from candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLayer {
    /// Layer that reproduces the instruction's result
    pub diff_id: DiffId,

    /// When the candidate originally committed it
    pub created_at: DateTime<Utc>,

    /// The cache-from reference the layer came from
    pub source: String,
}

/// Answer to one cache query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheAnswer {
    /// Nothing known reproduces this instruction; the build must run it.
    /// This is the expected common case.
    Miss,

    /// A local image is the exact result of this instruction
    Image(ImageId),

    /// A cache-from candidate's history covers this instruction; the
    /// build can extend its chain with the layer instead of executing
    Layer(CachedLayer),
}

impl CacheAnswer {
    pub fn is_hit(&self) -> bool {
        !matches!(self, Self::Miss)
    }
}

/// Cache resolution for one build
pub struct CacheResolver {
    store: Arc<dyn ImageStore>,
    direct: DirectMatcher,
    trackers: Vec<TrackerHandle>,
    plugin: Option<Arc<dyn CachePlugin>>,
    settings: ResolverSettings,
}

impl CacheResolver {
    /// Set up resolution for one build.
    ///
    /// Each cache-from reference is resolved against the stores in the
    /// order given; that order is the tie-break priority between matching
    /// candidates. References that do not resolve are skipped with a
    /// warning. A candidate that resolves but has corrupt history fails
    /// construction — its cache data cannot be trusted.
    pub async fn new(
        store: Arc<dyn ImageStore>,
        refs: Arc<dyn ReferenceStore>,
        comparator: Arc<dyn ConfigComparator>,
        cache_from: &[String],
        plugin: Option<Arc<dyn CachePlugin>>,
        settings: ResolverSettings,
    ) -> CacheResult<Self> {
        let mut trackers = Vec::with_capacity(cache_from.len());
        for reference in cache_from {
            let image = match lookup_image(store.as_ref(), refs.as_ref(), reference).await {
                Ok(image) => image,
                Err(e) => {
                    warn!(reference = %reference, error = %e, "skipping cache-from candidate");
                    continue;
                }
            };

            info!(reference = %reference, image = %image.id, "tracking cache-from candidate");
            let steps = derive_steps(&image)?;
            trackers.push(TrackerHandle::spawn(reference.clone(), TrackerCore::new(steps)));
        }

        Ok(Self {
            direct: DirectMatcher::new(Arc::clone(&store), comparator),
            store,
            trackers,
            plugin,
            settings,
        })
    }

    /// Answer one instruction's cache query.
    ///
    /// Callers invoke this strictly sequentially: each instruction's
    /// input state depends on the previous answer. Direct parent/config
    /// lineage always takes priority over cache-from matching.
    pub async fn get_cached_image_on_build(
        &mut self,
        query: &CacheQuery,
    ) -> CacheResult<CacheAnswer> {
        // a parent the store does not know aborts the step
        if let Some(parent) = &query.parent {
            self.store.get(parent).await?;
        }

        if let Some(image) = self
            .direct
            .get_cached_image(query.parent.as_ref(), &query.config)
            .await?
        {
            return Ok(CacheAnswer::Image(image.id));
        }

        if let Some(layer) = self.ask_trackers(query).await {
            return Ok(CacheAnswer::Layer(layer));
        }

        if let Some(id) = self.ask_plugin(query).await {
            return Ok(CacheAnswer::Image(id));
        }

        Ok(CacheAnswer::Miss)
    }

    /// How many cache-from candidates are still in the running
    pub fn open_trackers(&self) -> usize {
        self.trackers.iter().filter(|t| t.is_open()).count()
    }

    /// Fan one instruction out to every open tracker and keep the first
    /// match in declaration order.
    async fn ask_trackers(&mut self, query: &CacheQuery) -> Option<CachedLayer> {
        let command = extract_command(&query.config);

        let mut pending = Vec::new();
        for (index, tracker) in self.trackers.iter_mut().enumerate() {
            if !tracker.is_open() {
                continue;
            }
            if let Some(rx) = tracker.ask(&command, &query.preceding_layers).await {
                pending.push((index, rx));
            }
        }

        // each answer is awaited under its own deadline so a slow tracker
        // cannot starve the ones that answered in time
        let step_timeout = self.settings.step_timeout;
        let answers = join_all(pending.into_iter().map(|(index, rx)| async move {
            (index, timeout(step_timeout, rx).await)
        }))
        .await;

        let mut best: Option<(usize, TrackerHit)> = None;
        for (index, outcome) in answers {
            match outcome {
                Ok(Ok(Some(hit))) => {
                    if best.as_ref().map_or(true, |(winner, _)| index < *winner) {
                        best = Some((index, hit));
                    }
                }
                Ok(Ok(None)) | Ok(Err(_)) => {
                    // diverged or task gone; it can never match again
                    self.trackers[index].close();
                }
                Err(_) => {
                    warn!(
                        source = %self.trackers[index].source,
                        "cache-from tracker did not answer in time, closing it"
                    );
                    self.trackers[index].close();
                }
            }
        }

        best.map(|(index, hit)| CachedLayer {
            diff_id: hit.resulting,
            created_at: hit.created_at,
            source: self.trackers[index].source.clone(),
        })
    }

    /// Last-resort plugin consult; every failure degrades to a miss
    async fn ask_plugin(&self, query: &CacheQuery) -> Option<ImageId> {
        let plugin = self.plugin.as_ref()?;
        let request = WantsCachedImageRequest::new(query.parent.as_ref(), query.config.clone());

        let response = match timeout(
            self.settings.plugin_timeout,
            plugin.wants_cached_image(&request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(plugin = plugin.name(), error = %e, "cache plugin failed, treating as miss");
                return None;
            }
            Err(_) => {
                warn!(plugin = plugin.name(), "cache plugin timed out, treating as miss");
                return None;
            }
        };

        if response.is_miss() {
            return None;
        }

        // the plugin is responsible for pulling the image it reports;
        // only trust IDs that actually landed in the local store
        let id = ImageId::new(response.image_id);
        match self.store.get(&id).await {
            Ok(image) => {
                info!(plugin = plugin.name(), image = %image.id, "plugin cache hit");
                Some(image.id)
            }
            Err(e) => {
                warn!(
                    plugin = plugin.name(),
                    image = %id,
                    error = %e,
                    "plugin returned an image the store does not have, treating as miss"
                );
                None
            }
        }
    }
}
