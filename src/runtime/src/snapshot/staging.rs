//! Staging and quarantine directory naming under `<root>/snapshots`.
//!
//! New content is built in `new-<uuid>` and renamed to `<id>` once ready;
//! removed snapshots are renamed to `rm-<id>` before deletion. After a crash,
//! `new-*` is garbage; `rm-<id>` is garbage only once the metadata no longer
//! lists `<id>`.

use std::path::{Path, PathBuf};

use strata_core::error::{Result, StrataError};

pub const STAGING_PREFIX: &str = "new-";
pub const QUARANTINE_PREFIX: &str = "rm-";

const MAX_ALLOCATE_ATTEMPTS: u32 = 8;

/// The `snapshots/` directory and its naming rules.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final location of the snapshot with `id`.
    pub fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// Where a removed snapshot waits for deletion.
    pub fn quarantine_dir(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", QUARANTINE_PREFIX, id))
    }

    /// Create a fresh, uniquely named staging directory.
    pub fn allocate(&self) -> Result<StagingDir> {
        for _ in 0..MAX_ALLOCATE_ATTEMPTS {
            let path = self
                .dir
                .join(format!("{}{}", STAGING_PREFIX, uuid::Uuid::new_v4().simple()));
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(StagingDir { path, armed: true }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StrataError::CopyFailed {
                        path: path.display().to_string(),
                        message: format!("failed to create staging directory: {}", e),
                    })
                }
            }
        }
        Err(StrataError::Other(format!(
            "failed to allocate a unique staging directory in {}",
            self.dir.display()
        )))
    }

    /// True for names that only ever belong to interrupted work.
    pub fn is_transient(name: &str) -> bool {
        name.starts_with(STAGING_PREFIX) || name.starts_with(QUARANTINE_PREFIX)
    }

    /// Id of a quarantine directory name (`rm-<id>`).
    pub fn quarantined_id(name: &str) -> Option<&str> {
        name.strip_prefix(QUARANTINE_PREFIX)
            .filter(|id| Self::is_snapshot_id(id))
    }

    /// True when `name` is exactly how an id is rendered: decimal digits,
    /// no sign, no leading zero.
    pub fn is_snapshot_id(name: &str) -> bool {
        !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_digit())
            && !(name.len() > 1 && name.starts_with('0'))
    }
}

/// A staging directory that deletes itself unless persisted.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    armed: bool,
}

impl StagingDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically rename into `target`. `target` must not exist.
    pub fn persist(mut self, target: &Path) -> Result<()> {
        std::fs::rename(&self.path, target).map_err(|e| {
            StrataError::IoError(std::io::Error::new(
                e.kind(),
                format!(
                    "failed to rename {} to {}: {}",
                    self.path.display(),
                    target.display(),
                    e
                ),
            ))
        })?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove staging directory"
                );
            }
        }
    }
}
