//! History derivation
//!
//! An image's raw history records (command, produced-a-layer) pairs, while
//! cache matching needs (source layer, command, resulting layer) facts per
//! step. The derivation walks the layer list alongside the history,
//! mapping "no content yet" to the empty-layer digest.

use crate::error::{CacheError, CacheResult};
use crate::image::{DiffId, Image};
use chrono::{DateTime, Utc};

/// One instruction of an image's history with its layer-chain facts
///
/// The source of step *i* equals the result of step *i-1*; the result
/// equals the source when the instruction added no layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStep {
    /// Layer the command ran on
    pub source: DiffId,

    /// Layer produced by the command
    pub resulting: DiffId,

    /// Instruction text
    pub command: String,

    pub created_at: DateTime<Utc>,
}

/// Derive per-step layer-chain facts from an image's raw history.
///
/// Fails with [`CacheError::CorruptHistory`] when the history claims more
/// layer-producing entries than the image has layers; such an image's
/// cache data cannot be trusted.
pub fn derive_steps(image: &Image) -> CacheResult<Vec<HistoryStep>> {
    let empty = DiffId::empty_layer();
    let mut steps = Vec::with_capacity(image.history.len());
    let mut layer_index: Option<usize> = None;

    for entry in &image.history {
        let source = match layer_index {
            Some(i) => image.layer_diff_ids[i].clone(),
            None => empty.clone(),
        };

        if entry.produces_layer {
            let next = layer_index.map_or(0, |i| i + 1);
            if next >= image.layer_diff_ids.len() {
                return Err(CacheError::CorruptHistory {
                    id: image.id.clone(),
                    producing: image.history.iter().filter(|h| h.produces_layer).count(),
                    layers: image.layer_diff_ids.len(),
                });
            }
            layer_index = Some(next);
        }

        let resulting = match layer_index {
            Some(i) => image.layer_diff_ids[i].clone(),
            None => empty.clone(),
        };

        steps.push(HistoryStep {
            source,
            resulting,
            command: entry.command.clone(),
            created_at: entry.created_at,
        });
    }

    Ok(steps)
}
