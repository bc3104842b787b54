//! Local content-addressed blob store.
//!
//! Blobs are stored by SHA256 digest under `<root>/blobs/sha256/<hex>`.
//! Writes go to `<root>/ingest/` first and are renamed into place, so a blob
//! path only ever holds complete content.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use strata_core::error::{Result, StrataError};

const ALGORITHM: &str = "sha256";

/// A stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Digest (e.g., "sha256:abc123...")
    pub digest: String,
    /// Size in bytes
    pub size: u64,
}

pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (creating if needed) a content store rooted at `root`.
    pub fn new(root: &Path) -> Result<Self> {
        for dir in [root.join("blobs").join(ALGORITHM), root.join("ingest")] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                StrataError::ContentError(format!(
                    "Failed to create content directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the digest string for `data`.
    pub fn digest_of(data: &[u8]) -> String {
        format!("{}:{}", ALGORITHM, hex::encode(Sha256::digest(data)))
    }

    /// Filesystem path of `digest`. Rejects malformed digests.
    pub fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let hex = parse_digest(digest)?;
        Ok(self.root.join("blobs").join(ALGORITHM).join(hex))
    }

    /// Store `data` and return its digest. Storing existing content only
    /// refreshes its modification time.
    pub fn put(&self, data: &[u8]) -> Result<String> {
        let digest = Self::digest_of(data);
        let path = self.blob_path(&digest)?;
        if path.is_file() {
            // A fresh mtime keeps the blob out of a concurrent prune
            let touched = std::fs::File::options()
                .write(true)
                .open(&path)
                .and_then(|f| f.set_modified(SystemTime::now()));
            match touched {
                Ok(()) => return Ok(digest),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StrataError::ContentError(format!(
                        "Failed to touch blob {}: {}",
                        digest, e
                    )))
                }
            }
        }

        let tmp = self
            .root
            .join("ingest")
            .join(uuid::Uuid::new_v4().simple().to_string());
        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
            std::fs::rename(&tmp, &path)
        };
        if let Err(e) = write() {
            let _ = std::fs::remove_file(&tmp);
            return Err(StrataError::ContentError(format!(
                "Failed to write blob {}: {}",
                digest, e
            )));
        }

        tracing::debug!(digest = %digest, size = data.len(), "Stored blob");
        Ok(digest)
    }

    pub fn get(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(digest)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StrataError::NotFound(format!("blob {}", digest)),
            _ => StrataError::ContentError(format!("Failed to read blob {}: {}", digest, e)),
        })
    }

    pub fn exists(&self, digest: &str) -> Result<bool> {
        Ok(self.blob_path(digest)?.is_file())
    }

    pub fn delete(&self, digest: &str) -> Result<()> {
        let path = self.blob_path(digest)?;
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StrataError::NotFound(format!("blob {}", digest)),
            _ => StrataError::ContentError(format!("Failed to delete blob {}: {}", digest, e)),
        })?;
        tracing::debug!(digest = %digest, "Deleted blob");
        Ok(())
    }

    /// All stored blobs, sorted by digest.
    pub fn list(&self) -> Result<Vec<BlobInfo>> {
        let dir = self.root.join("blobs").join(ALGORITHM);
        let read_dir = std::fs::read_dir(&dir).map_err(|e| {
            StrataError::ContentError(format!(
                "Failed to read content directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut blobs = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| {
                StrataError::ContentError(format!("Failed to read directory entry: {}", e))
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let digest = format!("{}:{}", ALGORITHM, name);
            if parse_digest(&digest).is_err() {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if meta.is_file() {
                    blobs.push(BlobInfo {
                        digest,
                        size: meta.len(),
                    });
                }
            }
        }
        blobs.sort_by(|a, b| a.digest.cmp(&b.digest));
        Ok(blobs)
    }

    /// Get the total size of all blobs in bytes.
    pub fn total_size(&self) -> Result<u64> {
        Ok(self.list()?.iter().map(|b| b.size).sum())
    }

    /// Delete every blob not in `keep`, plus abandoned ingest files.
    ///
    /// Blobs and ingest files modified at or after `cutoff` are left alone;
    /// they may belong to a write that started after `keep` was computed.
    /// Returns the deleted blobs.
    pub fn prune(&self, keep: &HashSet<String>, cutoff: SystemTime) -> Result<Vec<BlobInfo>> {
        let mut deleted = Vec::new();
        for blob in self.list()? {
            if keep.contains(&blob.digest) || !older_than(&self.blob_path(&blob.digest)?, cutoff) {
                continue;
            }
            match self.delete(&blob.digest) {
                Ok(()) => deleted.push(blob),
                Err(StrataError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let ingest = self.root.join("ingest");
        let read_dir = std::fs::read_dir(&ingest).map_err(|e| {
            StrataError::ContentError(format!(
                "Failed to read ingest directory {}: {}",
                ingest.display(),
                e
            ))
        })?;
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !older_than(&path, cutoff) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed abandoned ingest file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove ingest file")
                }
            }
        }

        Ok(deleted)
    }
}

/// True when `path` was last modified before `cutoff`. Unreadable or
/// missing files count as new.
fn older_than(path: &Path, cutoff: SystemTime) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|mtime| mtime < cutoff)
        .unwrap_or(false)
}

/// Validate `sha256:<64 hex>` and return the hex part.
fn parse_digest(digest: &str) -> Result<&str> {
    let hex = digest
        .strip_prefix(ALGORITHM)
        .and_then(|rest| rest.strip_prefix(':'))
        .filter(|hex| {
            hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        });
    hex.ok_or_else(|| StrataError::InvalidArgument(format!("invalid digest: {:?}", digest)))
}
