//! Image data model
//!
//! Images are immutable once built and owned by the image store; the
//! resolver only reads them. Parent links are IDs into the store, not
//! references, so the parent/child relation is an index lookup rather
//! than an owned tree.

use crate::config::BuildConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

/// Content address identifying an image
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content address identifying one filesystem layer (diff ID)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffId(String);

impl DiffId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest raw layer bytes into the `sha256:<hex>` form the stores use
    pub fn digest(bytes: &[u8]) -> Self {
        Self(format!("sha256:{}", hex::encode(Sha256::digest(bytes))))
    }

    /// Canonical digest of an empty tar stream (1024 zero bytes).
    ///
    /// Marks "no filesystem content yet" in derived history steps: the
    /// source of a scratch image's first step and the result of leading
    /// metadata-only instructions.
    pub fn empty_layer() -> &'static DiffId {
        static EMPTY: OnceLock<DiffId> = OnceLock::new();
        EMPTY.get_or_init(|| Self::digest(&[0u8; 1024]))
    }
}

impl fmt::Display for DiffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DiffId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Record of one build instruction in an image's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Instruction text as the builder recorded it
    pub command: String,

    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// Whether the instruction added a filesystem layer
    /// (metadata-only instructions do not)
    pub produces_layer: bool,
}

/// An image as the store hands it out
///
/// `history` and `layer_diff_ids` are append-only and never reordered;
/// the number of layer-producing history entries equals the number of
/// layer diff IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,

    /// Parent image; `None` means built from scratch
    pub parent: Option<ImageId>,

    /// Build configuration that produced this image
    pub config: BuildConfig,

    pub created_at: DateTime<Utc>,

    /// One entry per build instruction
    pub history: Vec<HistoryEntry>,

    /// One diff ID per layer-producing instruction
    pub layer_diff_ids: Vec<DiffId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_layer_is_canonical_empty_tar_digest() {
        assert_eq!(
            DiffId::empty_layer().as_str(),
            "sha256:5f70bf18a086007016e948b04aed3b82103a36bea41755b6cdddaf10ace3c6ef"
        );
    }

    #[test]
    fn diff_id_digest_form() {
        let id = DiffId::digest(b"layer bytes");
        assert!(id.as_str().starts_with("sha256:"));
        assert_eq!(id.as_str().len(), "sha256:".len() + 64);
    }

    #[test]
    fn image_serialize_roundtrip() {
        let image = Image {
            id: ImageId::new("sha256:aaa"),
            parent: None,
            config: BuildConfig::default(),
            created_at: Utc::now(),
            history: vec![HistoryEntry {
                command: "/bin/sh -c echo hi".to_string(),
                created_at: Utc::now(),
                produces_layer: true,
            }],
            layer_diff_ids: vec![DiffId::new("sha256:l1")],
        };

        let json = serde_json::to_string(&image).unwrap();
        assert!(json.contains("sha256:aaa"));

        let parsed: Image = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, image.id);
        assert_eq!(parsed.layer_diff_ids, image.layer_diff_ids);
        assert!(parsed.parent.is_none());
    }
}
