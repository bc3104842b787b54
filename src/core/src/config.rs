use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};
use crate::log::LogConfig;

/// Environment variable overriding the state root.
pub const ROOT_ENV: &str = "STRATA_ROOT";

/// Name of the config file looked up under the state root.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// State root holding snapshots, metadata, and content
    pub root: PathBuf,

    /// Name of the union mount provider backing the snapshot root
    pub snapshotter: String,

    /// Union mount bridge settings
    pub union: UnionConfig,

    /// Logging
    pub log: LogConfig,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            snapshotter: "native".to_string(),
            union: UnionConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl StrataConfig {
    /// Load configuration from a YAML (or `.json`) file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            StrataError::ConfigError(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: StrataConfig = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&data)?
        } else {
            serde_yaml::from_str(&data)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration: explicit file, else `<root>/config.yaml` when
    /// present, else defaults. `STRATA_ROOT` overrides the root either way.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let env_root = std::env::var_os(ROOT_ENV).map(PathBuf::from);

        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let root = env_root.clone().unwrap_or_else(default_root);
                let candidate = root.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::load(&candidate)?
                } else {
                    Self::default()
                }
            }
        };

        if let Some(root) = env_root {
            config.root = root;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(StrataError::ConfigError("root must not be empty".to_string()));
        }
        if self.snapshotter.trim().is_empty() {
            return Err(StrataError::ConfigError(
                "snapshotter name must not be empty".to_string(),
            ));
        }
        if self.union.helper.trim().is_empty() {
            return Err(StrataError::ConfigError(
                "union.helper must not be empty".to_string(),
            ));
        }
        if self.union.mount_timeout_ms == 0 {
            return Err(StrataError::ConfigError(
                "union.mount_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Union mount bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnionConfig {
    /// FUSE union helper binary
    pub helper: String,

    /// Extra `-o` options passed to the helper
    pub options: Vec<String>,

    /// How long to wait for the kernel mount handshake
    pub mount_timeout_ms: u64,
}

impl Default for UnionConfig {
    fn default() -> Self {
        Self {
            helper: "fuse-overlayfs".to_string(),
            options: Vec::new(),
            mount_timeout_ms: 5000,
        }
    }
}

/// Default state root: `$XDG_DATA_HOME/strata`, else `~/.strata`.
pub fn default_root() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("strata"))
        .or_else(|| dirs::home_dir().map(|h| h.join(".strata")))
        .unwrap_or_else(|| PathBuf::from(".strata"))
}
