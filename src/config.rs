//! Build configuration and the equality seam
//!
//! Structural equality of build configurations is delegated to a
//! comparator collaborator. [`StrictComparator`] compares every field and
//! is what embedders use unless their config model needs looser rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration one build instruction would commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Command the instruction runs (exec form)
    #[serde(default)]
    pub cmd: Vec<String>,

    /// Entrypoint (exec form)
    #[serde(default)]
    pub entrypoint: Vec<String>,

    /// Environment, `KEY=VALUE`
    #[serde(default)]
    pub env: Vec<String>,

    /// Working directory inside the container
    #[serde(default)]
    pub workdir: String,

    /// User the command runs as
    #[serde(default)]
    pub user: String,

    /// Ports the image exposes
    #[serde(default)]
    pub exposed_ports: Vec<String>,

    /// Volumes declared by the instruction
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Image labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl BuildConfig {
    /// Probe configuration for a single command, the way a builder probes
    /// the cache before executing an instruction
    pub fn for_command<S: Into<String>>(cmd: impl IntoIterator<Item = S>) -> Self {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// The instruction text used for history matching: the whitespace-join of
/// the command, which is how builders record history entries.
pub fn extract_command(config: &BuildConfig) -> String {
    config.cmd.join(" ")
}

/// Build-configuration equality as seen by the cache
pub trait ConfigComparator: Send + Sync {
    fn equal(&self, a: &BuildConfig, b: &BuildConfig) -> bool;
}

/// Field-for-field structural equality
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictComparator;

impl ConfigComparator for StrictComparator {
    fn equal(&self, a: &BuildConfig, b: &BuildConfig) -> bool {
        a == b
    }
}
