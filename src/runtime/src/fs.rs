//! Filesystem helpers for materializing and measuring snapshot directories.
//!
//! `copy_dir` produces a full, independent copy of a committed layer (no
//! reflinks); `disk_usage` measures a live directory the same way a commit
//! records it.

use std::collections::{HashMap, HashSet};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use strata_core::error::{Result, StrataError};
use strata_core::snapshot::Usage;

fn copy_err(path: &Path, err: impl std::fmt::Display) -> StrataError {
    StrataError::CopyFailed {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Recursively copy the contents of `src` into `dst`.
///
/// `dst` may already exist (a freshly allocated staging directory) and is
/// given the mode and ownership of `src`. Hard links inside the tree are
/// preserved, symlinks are copied as links, device and fifo nodes are
/// recreated. Returns the number of regular-file bytes copied.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<u64> {
    let meta = std::fs::symlink_metadata(src).map_err(|e| copy_err(src, e))?;
    if !meta.is_dir() {
        return Err(copy_err(src, "source is not a directory"));
    }

    if !dst.exists() {
        std::fs::create_dir(dst).map_err(|e| copy_err(dst, e))?;
    }

    let mut links: HashMap<(u64, u64), PathBuf> = HashMap::new();
    let mut copied = 0u64;
    copy_tree(src, dst, &mut links, &mut copied)?;
    copy_attrs(dst, &meta)?;

    Ok(copied)
}

fn copy_tree(
    src: &Path,
    dst: &Path,
    links: &mut HashMap<(u64, u64), PathBuf>,
    copied: &mut u64,
) -> Result<()> {
    let read_dir = std::fs::read_dir(src).map_err(|e| copy_err(src, e))?;

    for entry in read_dir {
        let entry = entry.map_err(|e| copy_err(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let meta = std::fs::symlink_metadata(&src_path).map_err(|e| copy_err(&src_path, e))?;
        let file_type = meta.file_type();

        if file_type.is_dir() {
            std::fs::create_dir(&dst_path).map_err(|e| copy_err(&dst_path, e))?;
            copy_tree(&src_path, &dst_path, links, copied)?;
            // Applied after the children so read-only directories can be filled
            copy_attrs(&dst_path, &meta)?;
            continue;
        }

        if file_type.is_symlink() {
            let target = std::fs::read_link(&src_path).map_err(|e| copy_err(&src_path, e))?;
            std::os::unix::fs::symlink(&target, &dst_path).map_err(|e| copy_err(&dst_path, e))?;
            chown_best_effort(&dst_path, &meta);
            continue;
        }

        if meta.nlink() > 1 {
            let inode = (meta.dev(), meta.ino());
            if let Some(first) = links.get(&inode) {
                std::fs::hard_link(first, &dst_path).map_err(|e| copy_err(&dst_path, e))?;
                continue;
            }
            links.insert(inode, dst_path.clone());
        }

        if file_type.is_file() {
            *copied += std::fs::copy(&src_path, &dst_path).map_err(|e| copy_err(&src_path, e))?;
        } else {
            make_node(&dst_path, &meta)?;
        }
        copy_attrs(&dst_path, &meta)?;
    }

    Ok(())
}

/// Recreate a fifo, socket, or device node.
fn make_node(path: &Path, meta: &std::fs::Metadata) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| copy_err(path, e))?;
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the
    // call; mknod does not retain the pointer.
    let rc = unsafe {
        libc::mknod(
            c_path.as_ptr(),
            meta.mode() as libc::mode_t,
            meta.rdev() as libc::dev_t,
        )
    };
    if rc != 0 {
        return Err(copy_err(path, std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Apply ownership (best effort) then permission bits of `meta` to `path`.
fn copy_attrs(path: &Path, meta: &std::fs::Metadata) -> Result<()> {
    // chown clears setuid/setgid, so it must run before chmod
    chown_best_effort(path, meta);
    let perms = std::fs::Permissions::from_mode(meta.mode() & 0o7777);
    std::fs::set_permissions(path, perms).map_err(|e| copy_err(path, e))
}

fn chown_best_effort(path: &Path, meta: &std::fs::Metadata) {
    if let Err(e) = std::os::unix::fs::lchown(path, Some(meta.uid()), Some(meta.gid())) {
        if e.kind() != std::io::ErrorKind::PermissionDenied {
            tracing::debug!(path = %path.display(), error = %e, "Failed to copy ownership");
        }
    }
}

/// Measure a directory tree.
///
/// `size` sums the apparent length of every non-directory entry, counting
/// each hard-linked inode once; `inodes` counts unique inodes including
/// directories and `root` itself.
pub fn disk_usage(root: &Path) -> std::io::Result<Usage> {
    let meta = std::fs::symlink_metadata(root)?;
    let mut seen: HashSet<(u64, u64)> = HashSet::new();
    let mut usage = Usage::default();

    account(&meta, &mut seen, &mut usage);
    if meta.is_dir() {
        walk_usage(root, &mut seen, &mut usage)?;
    }

    Ok(usage)
}

fn walk_usage(dir: &Path, seen: &mut HashSet<(u64, u64)>, usage: &mut Usage) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = std::fs::symlink_metadata(entry.path())?;
        account(&meta, seen, usage);
        if meta.is_dir() {
            walk_usage(&entry.path(), seen, usage)?;
        }
    }
    Ok(())
}

fn account(meta: &std::fs::Metadata, seen: &mut HashSet<(u64, u64)>, usage: &mut Usage) {
    if !seen.insert((meta.dev(), meta.ino())) {
        return;
    }
    usage.inodes += 1;
    if !meta.is_dir() {
        usage.size += meta.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_tree(dir: &Path, files: &[(&str, &str)]) {
        std::fs::create_dir_all(dir).unwrap();
        for (name, content) in files {
            let file_path = dir.join(name);
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&file_path, content).unwrap();
        }
    }

    #[test]
    fn test_copy_dir_nested_content() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        create_tree(&src, &[("a.txt", "aaa"), ("sub/b.txt", "bbb"), ("sub/deep/c.txt", "ccc")]);

        let copied = copy_dir(&src, &dst).unwrap();

        assert_eq!(copied, 9);
        assert_eq!(std::fs::read_to_string(dst.join("a.txt")).unwrap(), "aaa");
        assert_eq!(std::fs::read_to_string(dst.join("sub/b.txt")).unwrap(), "bbb");
        assert_eq!(std::fs::read_to_string(dst.join("sub/deep/c.txt")).unwrap(), "ccc");
    }

    #[test]
    fn test_copy_dir_into_existing_empty_destination() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("staging");
        create_tree(&src, &[("f", "x")]);
        std::fs::create_dir(&dst).unwrap();

        copy_dir(&src, &dst).unwrap();
        assert!(dst.join("f").is_file());
    }

    #[test]
    fn test_copy_dir_preserves_symlinks() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        create_tree(&src, &[("target.txt", "data")]);
        std::os::unix::fs::symlink("target.txt", src.join("link")).unwrap();
        std::os::unix::fs::symlink("/does/not/exist", src.join("dangling")).unwrap();

        copy_dir(&src, &dst).unwrap();

        let meta = std::fs::symlink_metadata(dst.join("link")).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(
            std::fs::read_link(dst.join("link")).unwrap(),
            PathBuf::from("target.txt")
        );
        assert_eq!(
            std::fs::read_link(dst.join("dangling")).unwrap(),
            PathBuf::from("/does/not/exist")
        );
    }

    #[test]
    fn test_copy_dir_preserves_hard_links() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        create_tree(&src, &[("one", "shared")]);
        std::fs::hard_link(src.join("one"), src.join("two")).unwrap();

        copy_dir(&src, &dst).unwrap();

        let one = std::fs::metadata(dst.join("one")).unwrap();
        let two = std::fs::metadata(dst.join("two")).unwrap();
        assert_eq!(one.ino(), two.ino());
        assert_eq!(one.nlink(), 2);
    }

    #[test]
    fn test_copy_dir_preserves_permissions() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        create_tree(&src, &[("run.sh", "#!/bin/sh\n")]);
        std::fs::set_permissions(src.join("run.sh"), std::fs::Permissions::from_mode(0o750))
            .unwrap();

        copy_dir(&src, &dst).unwrap();

        let mode = std::fs::metadata(dst.join("run.sh")).unwrap().mode() & 0o777;
        assert_eq!(mode, 0o750);
    }

    #[test]
    fn test_copy_dir_is_independent_of_source() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        create_tree(&src, &[("f.txt", "original")]);

        copy_dir(&src, &dst).unwrap();
        std::fs::write(dst.join("f.txt"), "changed").unwrap();

        assert_eq!(std::fs::read_to_string(src.join("f.txt")).unwrap(), "original");
    }

    #[test]
    fn test_copy_dir_recreates_fifo() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std::fs::create_dir(&src).unwrap();
        let fifo = CString::new(src.join("pipe").as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(fifo.as_ptr(), 0o644) }, 0);

        copy_dir(&src, &dst).unwrap();

        use std::os::unix::fs::FileTypeExt;
        let meta = std::fs::symlink_metadata(dst.join("pipe")).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn test_copy_dir_source_not_exists() {
        let tmp = TempDir::new().unwrap();
        let result = copy_dir(&tmp.path().join("missing"), &tmp.path().join("dst"));
        assert!(matches!(result, Err(StrataError::CopyFailed { .. })));
    }

    #[test]
    fn test_copy_dir_source_is_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file");
        std::fs::write(&file, "x").unwrap();
        let result = copy_dir(&file, &tmp.path().join("dst"));
        assert!(matches!(result, Err(StrataError::CopyFailed { .. })));
    }

    #[test]
    fn test_disk_usage_counts_file_bytes_and_inodes() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sized");
        create_tree(&dir, &[("a.txt", "hello"), ("sub/b.txt", "world")]);

        let usage = disk_usage(&dir).unwrap();
        assert_eq!(usage.size, 10);
        // root, sub/, a.txt, b.txt
        assert_eq!(usage.inodes, 4);
    }

    #[test]
    fn test_disk_usage_counts_hard_links_once() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("linked");
        create_tree(&dir, &[("one", "0123456789")]);
        std::fs::hard_link(dir.join("one"), dir.join("two")).unwrap();

        let usage = disk_usage(&dir).unwrap();
        assert_eq!(usage.size, 10);
        assert_eq!(usage.inodes, 2);
    }

    #[test]
    fn test_disk_usage_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let usage = disk_usage(tmp.path()).unwrap();
        assert_eq!(usage, Usage { size: 0, inodes: 1 });
    }

    #[test]
    fn test_disk_usage_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let err = disk_usage(&tmp.path().join("gone")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
