//! Executor - runs one build step against prepared snapshot mounts.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_core::error::Result;
use strata_core::snapshot::MountSpec;

/// One filesystem-mutating build step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Key of the active snapshot the step writes into
    pub key: String,
    /// Committed snapshot the step starts from
    #[serde(default)]
    pub parent: Option<String>,
    /// Name the result is committed under
    pub name: String,
    /// Command line to run
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Labels attached to the resulting snapshot
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Trait for sandboxed process executors.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executor name, recorded in the worker labels.
    fn name(&self) -> &str;

    /// Run `step` with `mounts` bound as its root filesystem.
    async fn run(&self, step: &BuildStep, mounts: &[MountSpec]) -> Result<()>;
}
