//! Union mount abstraction and provider registry.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use strata_core::config::StrataConfig;
use strata_core::error::{Result, StrataError};

use super::fuse::FuseUnionProvider;
use super::mountinfo::MountInfo;
use super::native::NativeProvider;

/// A live union mount backing the snapshot root.
pub trait UnionMount: Send + Sync + std::fmt::Debug {
    /// Directory the mount is attached to.
    fn target(&self) -> &Path;

    /// Current mount table entry for the target.
    ///
    /// Fails with `MountUnavailable` once the mount has gone away.
    fn info(&self) -> Result<MountInfo>;

    /// Detach the mount. Idempotent.
    fn unmount(&mut self) -> Result<()>;
}

/// Factory for union mounts of one kind.
pub trait UnionMountProvider: Send + Sync {
    /// Registry name, also used as the worker's snapshotter label.
    fn name(&self) -> &str;

    /// Attach a union mount at `target`, creating the directory if needed.
    ///
    /// Blocks until the mount is visible or the provider gives up.
    fn mount(&self, target: &Path) -> Result<Box<dyn UnionMount>>;
}

/// Named union mount providers.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn UnionMountProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `native` and `fuse` providers.
    ///
    /// FUSE branch directories live under `<root>/fuse/branches`.
    pub fn with_defaults(config: &StrataConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NativeProvider::new()));
        registry.register(Arc::new(FuseUnionProvider::new(
            config.root.join("fuse").join("branches"),
            config.union.clone(),
        )));
        registry
    }

    /// Add a provider, replacing any provider with the same name.
    pub fn register(&mut self, provider: Arc<dyn UnionMountProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn UnionMountProvider>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            StrataError::ConfigError(format!(
                "unknown snapshotter '{}' (available: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}
