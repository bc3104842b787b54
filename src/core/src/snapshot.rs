//! Snapshot data model shared by the runtime and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Label naming a content-store digest that a snapshot keeps alive during GC.
pub const LABEL_GC_REF_CONTENT: &str = "strata.io/gc.ref.content";

/// Kind of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Writable, newly allocated storage.
    Active,
    /// Read-only projection over a committed parent.
    View,
    /// Immutable, finalized layer usable as a parent.
    Committed,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::View => write!(f, "view"),
            Self::Committed => write!(f, "committed"),
        }
    }
}

impl std::str::FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "view" => Ok(Self::View),
            "committed" => Ok(Self::Committed),
            _ => Err(format!(
                "unknown snapshot kind: '{}' (supported: active, view, committed)",
                s
            )),
        }
    }
}

/// Disk usage of a snapshot directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Apparent size in bytes of all non-directory entries (hard links once).
    pub size: u64,
    /// Number of unique inodes, directories included.
    pub inodes: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.size += other.size;
        self.inodes += other.inodes;
    }
}

/// Public metadata for a snapshot, addressed by key (active/view) or name (committed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// Key of an active/view snapshot, or the name of a committed one
    pub name: String,
    /// Name of the parent snapshot, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Current kind
    pub kind: Kind,
    /// User labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// When the snapshot was created
    pub created: DateTime<Utc>,
    /// When the snapshot metadata last changed
    pub updated: DateTime<Utc>,
}

/// Storage-level view of a snapshot: its id and ancestor ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub kind: Kind,
    /// Ancestor ids, nearest parent first
    pub parent_ids: Vec<String>,
}

/// Options accepted by prepare, view, and commit.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOpts {
    pub labels: HashMap<String, String>,
}

impl SnapshotOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a label to the snapshot being created or committed.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Mount descriptor handed to an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Host directory backing the mount
    pub source: PathBuf,
    /// Mount type (always "bind")
    #[serde(rename = "type")]
    pub fs_type: String,
    /// Mount options, e.g. ["rw", "rbind"]
    pub options: Vec<String>,
}

impl MountSpec {
    /// Recursive bind mount of `source`, read-only when `readonly` is set.
    pub fn bind(source: impl AsRef<Path>, readonly: bool) -> Self {
        let flag = if readonly { "ro" } else { "rw" };
        Self {
            source: source.as_ref().to_path_buf(),
            fs_type: "bind".to_string(),
            options: vec![flag.to_string(), "rbind".to_string()],
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.options.iter().any(|o| o == "ro")
    }
}
