//! Pass-through provider: the snapshot root is a plain host directory.
//!
//! Useful on hosts without FUSE and in tests.

use std::path::{Path, PathBuf};

use strata_core::error::{Result, StrataError};

use super::mountinfo::{self, MountInfo};
use super::union::{UnionMount, UnionMountProvider};

pub const NATIVE_PROVIDER: &str = "native";

#[derive(Debug, Default)]
pub struct NativeProvider;

impl NativeProvider {
    pub fn new() -> Self {
        Self
    }
}

impl UnionMountProvider for NativeProvider {
    fn name(&self) -> &str {
        NATIVE_PROVIDER
    }

    fn mount(&self, target: &Path) -> Result<Box<dyn UnionMount>> {
        std::fs::create_dir_all(target).map_err(|e| StrataError::MountUnavailable {
            root: target.display().to_string(),
            message: format!("failed to create directory: {}", e),
        })?;
        Ok(Box::new(NativeMount {
            target: target.to_path_buf(),
        }))
    }
}

#[derive(Debug)]
pub struct NativeMount {
    target: PathBuf,
}

impl UnionMount for NativeMount {
    fn target(&self) -> &Path {
        &self.target
    }

    fn info(&self) -> Result<MountInfo> {
        if !self.target.is_dir() {
            return Err(StrataError::MountUnavailable {
                root: self.target.display().to_string(),
                message: "directory does not exist".to_string(),
            });
        }
        match mountinfo::lookup(&self.target) {
            Ok(info) => Ok(info),
            Err(e) => {
                tracing::debug!(error = %e, "Mount table unavailable, using placeholder");
                Ok(MountInfo::unknown(&self.target))
            }
        }
    }

    fn unmount(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_mount_creates_target() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("root");
        let mut mount = NativeProvider::new().mount(&target).unwrap();

        assert!(target.is_dir());
        assert_eq!(mount.target(), target.as_path());
        mount.info().unwrap();
        mount.unmount().unwrap();
        mount.unmount().unwrap();
    }

    #[test]
    fn test_native_info_fails_when_target_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("root");
        let mount = NativeProvider::new().mount(&target).unwrap();
        std::fs::remove_dir(&target).unwrap();

        assert!(matches!(
            mount.info(),
            Err(StrataError::MountUnavailable { .. })
        ));
    }
}
