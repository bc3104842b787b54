//! Parser for `/proc/self/mountinfo`.

use std::path::{Path, PathBuf};

use strata_core::error::{Result, StrataError};

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// One line of the kernel mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub mount_id: u32,
    pub parent_id: u32,
    /// `major:minor` of the backing device
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    /// Mount source as reported by the filesystem (e.g. the helper name for FUSE)
    pub source: String,
    pub options: Vec<String>,
}

impl MountInfo {
    /// FUSE mounts report `fuse` or `fuse.<subtype>`.
    pub fn is_fuse(&self) -> bool {
        self.fs_type == "fuse" || self.fs_type.starts_with("fuse.")
    }

    /// Placeholder used when the mount table cannot be read.
    pub fn unknown(mount_point: &Path) -> Self {
        Self {
            mount_id: 0,
            parent_id: 0,
            device: "0:0".to_string(),
            mount_point: mount_point.to_path_buf(),
            fs_type: "none".to_string(),
            source: "none".to_string(),
            options: Vec::new(),
        }
    }
}

/// Parse mountinfo text. Malformed lines are errors.
///
/// Format: `id parent major:minor root mount_point options [optional...] - fstype source super_options`
pub fn parse_mountinfo(content: &str) -> Result<Vec<MountInfo>> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<MountInfo> {
    let malformed = || StrataError::Other(format!("malformed mountinfo line: {:?}", line));

    let (pre, post) = line.split_once(" - ").ok_or_else(malformed)?;
    let pre: Vec<&str> = pre.split_whitespace().collect();
    let post: Vec<&str> = post.split_whitespace().collect();
    if pre.len() < 6 || post.len() < 2 {
        return Err(malformed());
    }

    Ok(MountInfo {
        mount_id: pre[0].parse().map_err(|_| malformed())?,
        parent_id: pre[1].parse().map_err(|_| malformed())?,
        device: pre[2].to_string(),
        mount_point: PathBuf::from(unescape(pre[4])),
        options: pre[5].split(',').map(str::to_string).collect(),
        fs_type: post[0].to_string(),
        source: unescape(post[1]),
    })
}

/// Decode the kernel's octal escapes (`\040` for space, etc).
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let value = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(value) = value {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Find the mount containing `path`: the longest matching mount point, the
/// most recent one when mounts are stacked.
pub fn lookup_in<'a>(mounts: &'a [MountInfo], path: &Path) -> Option<&'a MountInfo> {
    let mut best: Option<&MountInfo> = None;
    for mount in mounts {
        if !path.starts_with(&mount.mount_point) {
            continue;
        }
        let deeper = match best {
            None => true,
            Some(current) => {
                mount.mount_point.as_os_str().len() >= current.mount_point.as_os_str().len()
            }
        };
        if deeper {
            best = Some(mount);
        }
    }
    best
}

/// Look up the mount containing `path` in the live mount table.
pub fn lookup(path: &Path) -> Result<MountInfo> {
    let unavailable = |message: String| StrataError::MountUnavailable {
        root: path.display().to_string(),
        message,
    };

    let resolved = path
        .canonicalize()
        .map_err(|e| unavailable(format!("cannot resolve path: {}", e)))?;
    let content = std::fs::read_to_string(MOUNTINFO_PATH)
        .map_err(|e| unavailable(format!("cannot read {}: {}", MOUNTINFO_PATH, e)))?;
    let mounts = parse_mountinfo(&content)?;

    lookup_in(&mounts, &resolved)
        .cloned()
        .ok_or_else(|| unavailable("no mount contains this path".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw,errors=remount-ro
35 22 0:31 / /proc rw,nosuid,nodev,noexec,relatime shared:13 - proc proc rw
61 22 8:1 /var/lib /var/lib rw,relatime shared:1 - ext4 /dev/sda1 rw
88 61 0:52 / /var/lib/strata/snapshots rw,nosuid,nodev,relatime shared:40 - fuse.fuse-overlayfs fuse-overlayfs rw,user_id=0,group_id=0
90 22 0:53 / /mnt/with\\040space rw - tmpfs tmpfs rw
";

    #[test]
    fn test_parse_sample() {
        let mounts = parse_mountinfo(SAMPLE).unwrap();
        assert_eq!(mounts.len(), 5);

        let fuse = &mounts[3];
        assert_eq!(fuse.mount_id, 88);
        assert_eq!(fuse.parent_id, 61);
        assert_eq!(fuse.device, "0:52");
        assert_eq!(fuse.mount_point, PathBuf::from("/var/lib/strata/snapshots"));
        assert_eq!(fuse.fs_type, "fuse.fuse-overlayfs");
        assert_eq!(fuse.source, "fuse-overlayfs");
        assert!(fuse.options.contains(&"nosuid".to_string()));
        assert!(fuse.is_fuse());
        assert!(!mounts[0].is_fuse());
    }

    #[test]
    fn test_parse_unescapes_spaces() {
        let mounts = parse_mountinfo(SAMPLE).unwrap();
        assert_eq!(mounts[4].mount_point, PathBuf::from("/mnt/with space"));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_mountinfo("garbage line without separator").is_err());
        assert!(parse_mountinfo("1 2 - ext4").is_err());
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_mountinfo("").unwrap().is_empty());
    }

    #[test]
    fn test_lookup_longest_prefix() {
        let mounts = parse_mountinfo(SAMPLE).unwrap();

        let hit = lookup_in(&mounts, Path::new("/var/lib/strata/snapshots/12")).unwrap();
        assert_eq!(hit.mount_id, 88);

        let hit = lookup_in(&mounts, Path::new("/var/lib/other")).unwrap();
        assert_eq!(hit.mount_id, 61);

        let hit = lookup_in(&mounts, Path::new("/home")).unwrap();
        assert_eq!(hit.mount_id, 22);
    }

    #[test]
    fn test_lookup_respects_component_boundaries() {
        let mounts = parse_mountinfo(SAMPLE).unwrap();
        let hit = lookup_in(&mounts, Path::new("/var/lib/strata/snapshots-old")).unwrap();
        assert_eq!(hit.mount_id, 61);
    }

    #[test]
    fn test_lookup_stacked_prefers_latest() {
        let content = "\
22 1 8:1 / / rw - ext4 /dev/sda1 rw
40 22 0:40 / /data rw - tmpfs tmpfs rw
41 40 0:41 / /data rw - fuse.unionfs unionfs rw
";
        let mounts = parse_mountinfo(content).unwrap();
        let hit = lookup_in(&mounts, Path::new("/data/x")).unwrap();
        assert_eq!(hit.mount_id, 41);
    }
}
