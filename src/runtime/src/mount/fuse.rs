//! FUSE union mount driven by an external helper process.
//!
//! The helper (`fuse-overlayfs` by default) stacks a writable upper branch
//! over a base branch and serves the merged tree at the target. It runs in
//! the foreground as our child so its lifetime is tied to the mount.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use strata_core::config::UnionConfig;
use strata_core::error::{Result, StrataError};

use super::mountinfo::{self, MountInfo};
use super::union::{UnionMount, UnionMountProvider};

pub const FUSE_PROVIDER: &str = "fuse";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Branch layout of a union mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branches {
    /// Read-only base branch
    pub lower: PathBuf,
    /// Writable branch receiving all changes
    pub upper: PathBuf,
    /// Scratch directory required by the helper
    pub work: PathBuf,
}

impl Branches {
    pub fn under(dir: &Path) -> Self {
        Self {
            lower: dir.join("lower"),
            upper: dir.join("upper"),
            work: dir.join("work"),
        }
    }

    fn create(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.lower)?;
        std::fs::create_dir_all(&self.upper)?;
        std::fs::create_dir_all(&self.work)
    }
}

/// Builds FUSE union mounts with the configured helper.
#[derive(Debug, Clone)]
pub struct FuseUnionProvider {
    branches: Branches,
    config: UnionConfig,
}

impl FuseUnionProvider {
    pub fn new(branches_dir: impl AsRef<Path>, config: UnionConfig) -> Self {
        Self {
            branches: Branches::under(branches_dir.as_ref()),
            config,
        }
    }

    pub fn branches(&self) -> &Branches {
        &self.branches
    }

    /// Helper command line for mounting at `target`.
    pub fn helper_args(&self, target: &Path) -> Vec<String> {
        let mut options = vec![
            format!("lowerdir={}", self.branches.lower.display()),
            format!("upperdir={}", self.branches.upper.display()),
            format!("workdir={}", self.branches.work.display()),
        ];
        options.extend(self.config.options.iter().cloned());

        vec![
            "-f".to_string(),
            "-o".to_string(),
            options.join(","),
            target.display().to_string(),
        ]
    }

    fn unavailable(target: &Path, message: impl Into<String>) -> StrataError {
        StrataError::MountUnavailable {
            root: target.display().to_string(),
            message: message.into(),
        }
    }

    /// Poll the mount table until `target` shows up as a FUSE mount.
    fn wait_for_mount(&self, target: &Path, child: &mut Child) -> Result<MountInfo> {
        let deadline = Instant::now() + Duration::from_millis(self.config.mount_timeout_ms);

        loop {
            if let Ok(info) = mountinfo::lookup(target) {
                if info.mount_point == target && info.is_fuse() {
                    return Ok(info);
                }
            }

            if let Ok(Some(status)) = child.try_wait() {
                return Err(Self::unavailable(
                    target,
                    format!("{} exited before mounting: {}", self.config.helper, status),
                ));
            }

            if Instant::now() >= deadline {
                return Err(Self::unavailable(
                    target,
                    format!(
                        "{} did not mount within {}ms",
                        self.config.helper, self.config.mount_timeout_ms
                    ),
                ));
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl UnionMountProvider for FuseUnionProvider {
    fn name(&self) -> &str {
        FUSE_PROVIDER
    }

    fn mount(&self, target: &Path) -> Result<Box<dyn UnionMount>> {
        self.branches.create().map_err(|e| {
            Self::unavailable(target, format!("failed to create branch directories: {}", e))
        })?;
        std::fs::create_dir_all(target)
            .map_err(|e| Self::unavailable(target, format!("failed to create target: {}", e)))?;
        let target = target
            .canonicalize()
            .map_err(|e| Self::unavailable(target, format!("cannot resolve target: {}", e)))?;

        // A mount left behind by a crashed process has no live helper
        if let Ok(stale) = mountinfo::lookup(&target) {
            if stale.mount_point == target && stale.is_fuse() {
                tracing::warn!(mountpoint = %target.display(), "Detaching stale FUSE mount");
                fusermount_unmount(&target)?;
            }
        }

        let mut cmd = Command::new(&self.config.helper);
        cmd.args(self.helper_args(&target))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| {
            Self::unavailable(
                &target,
                format!(
                    "failed to spawn {}: {} (is it installed?)",
                    self.config.helper, e
                ),
            )
        })?;

        tracing::info!(
            pid = child.id(),
            helper = %self.config.helper,
            mountpoint = %target.display(),
            "FUSE union helper started"
        );

        match self.wait_for_mount(&target, &mut child) {
            Ok(info) => {
                tracing::debug!(
                    mountpoint = %target.display(),
                    fs_type = %info.fs_type,
                    source = %info.source,
                    "FUSE union mount ready"
                );
                Ok(Box::new(FuseMount {
                    target,
                    child: Some(child),
                    mounted: true,
                }))
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(e)
            }
        }
    }
}

/// A mounted FUSE union. Unmounts on drop.
#[derive(Debug)]
pub struct FuseMount {
    target: PathBuf,
    child: Option<Child>,
    mounted: bool,
}

impl FuseMount {
    fn reap_helper(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = child.id();
        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => std::thread::sleep(POLL_INTERVAL),
                _ => {
                    if let Err(e) = child.kill() {
                        tracing::warn!(pid, error = %e, "Failed to kill FUSE helper");
                    }
                    let _ = child.wait();
                    break;
                }
            }
        }
        tracing::info!(pid, "FUSE union helper stopped");
    }
}

impl UnionMount for FuseMount {
    fn target(&self) -> &Path {
        &self.target
    }

    fn info(&self) -> Result<MountInfo> {
        let info = mountinfo::lookup(&self.target)?;
        if info.mount_point != self.target || !info.is_fuse() {
            return Err(StrataError::MountUnavailable {
                root: self.target.display().to_string(),
                message: format!("found {} mount at {}", info.fs_type, info.mount_point.display()),
            });
        }
        Ok(info)
    }

    fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        fusermount_unmount(&self.target)?;
        self.mounted = false;
        self.reap_helper();
        Ok(())
    }
}

impl Drop for FuseMount {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            tracing::warn!(mountpoint = %self.target.display(), error = %e, "Failed to unmount FUSE union");
            self.reap_helper();
        }
    }
}

/// Detach a FUSE mount with `fusermount3`, falling back to `fusermount`.
fn fusermount_unmount(target: &Path) -> Result<()> {
    let mut last_error = String::new();
    for tool in ["fusermount3", "fusermount"] {
        match Command::new(tool)
            .arg("-u")
            .arg(target)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
        {
            Ok(output) if output.status.success() => return Ok(()),
            Ok(output) => {
                last_error = format!(
                    "{} -u failed: {}",
                    tool,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => last_error = format!("{}: {}", tool, e),
        }
    }
    Err(StrataError::MountUnavailable {
        root: target.display().to_string(),
        message: last_error,
    })
}
