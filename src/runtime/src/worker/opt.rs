//! Worker assembly: one state directory per snapshotter under the root.
//!
//! ```text
//! <root>/<snapshotter>/
//!   snapshots/   union-mounted snapshot root (metadata.db, snapshots/<id>)
//!   content/     content-addressed blobs
//!   workerid     stable worker identity
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_core::config::StrataConfig;
use strata_core::error::{Result, StrataError};

use super::executor::Executor;
use crate::content::ContentStore;
use crate::mount::ProviderRegistry;
use crate::snapshot::Snapshotter;

pub const LABEL_EXECUTOR: &str = "strata.io/worker.executor";
pub const LABEL_SNAPSHOTTER: &str = "strata.io/worker.snapshotter";
pub const LABEL_HOSTNAME: &str = "strata.io/worker.hostname";

const WORKER_ID_FILE: &str = "workerid";

/// Everything a worker needs, built from configuration.
#[derive(Clone)]
pub struct WorkerOpt {
    pub id: String,
    pub labels: HashMap<String, String>,
    pub root: PathBuf,
    pub snapshotter: Snapshotter,
    pub content: Arc<ContentStore>,
    pub executor: Option<Arc<dyn Executor>>,
}

impl WorkerOpt {
    /// Lay out the state directory and start the configured snapshotter.
    ///
    /// Blocks while the union mount comes up.
    pub fn new(
        config: &StrataConfig,
        registry: &ProviderRegistry,
        executor: Option<Arc<dyn Executor>>,
    ) -> Result<Self> {
        let provider = registry.get(&config.snapshotter)?;
        let root = config.root.join(provider.name());
        std::fs::create_dir_all(&root).map_err(|e| {
            StrataError::ConfigError(format!(
                "Failed to create worker state directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let id = load_or_create_id(&root.join(WORKER_ID_FILE))?;
        let snapshotter = Snapshotter::new(root.join("snapshots"), provider.as_ref())?;
        let content = Arc::new(ContentStore::new(&root.join("content"))?);

        let mut labels = HashMap::new();
        labels.insert(LABEL_SNAPSHOTTER.to_string(), provider.name().to_string());
        if let Some(executor) = &executor {
            labels.insert(LABEL_EXECUTOR.to_string(), executor.name().to_string());
        }
        if let Some(hostname) = hostname() {
            labels.insert(LABEL_HOSTNAME.to_string(), hostname);
        }

        tracing::info!(
            worker_id = %id,
            snapshotter = provider.name(),
            root = %root.display(),
            "Worker initialized"
        );

        Ok(Self {
            id,
            labels,
            root,
            snapshotter,
            content,
            executor,
        })
    }
}

/// Read the persisted worker id, generating one on first use.
fn load_or_create_id(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(id) if !id.trim().is_empty() => return Ok(id.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(StrataError::ConfigError(format!(
                "Failed to read worker id {}: {}",
                path.display(),
                e
            )))
        }
    }

    let id = uuid::Uuid::new_v4().simple().to_string();
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &id)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| {
            StrataError::ConfigError(format!(
                "Failed to write worker id {}: {}",
                path.display(),
                e
            ))
        })?;
    Ok(id)
}

fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for `buf.len()` bytes and gethostname
    // writes at most that many.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..len]).into_owned();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_is_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(WORKER_ID_FILE);

        let first = load_or_create_id(&path).unwrap();
        let second = load_or_create_id(&path).unwrap();

        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
    }

    #[test]
    fn test_worker_id_regenerated_when_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(WORKER_ID_FILE);
        std::fs::write(&path, "\n").unwrap();

        let id = load_or_create_id(&path).unwrap();
        assert!(!id.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), id);
    }

    #[test]
    fn test_opt_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StrataConfig {
            root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let registry = ProviderRegistry::with_defaults(&config);

        let opt = WorkerOpt::new(&config, &registry, None).unwrap();

        assert_eq!(opt.root, tmp.path().join("native"));
        assert!(opt.root.join("snapshots").join("metadata.db").is_file());
        assert!(opt.root.join("content").join("blobs").is_dir());
        assert_eq!(
            opt.labels.get(LABEL_SNAPSHOTTER).map(String::as_str),
            Some("native")
        );
        assert!(!opt.labels.contains_key(LABEL_EXECUTOR));
    }

    #[test]
    fn test_opt_unknown_snapshotter() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StrataConfig {
            root: tmp.path().to_path_buf(),
            snapshotter: "zfs".to_string(),
            ..Default::default()
        };
        let registry = ProviderRegistry::with_defaults(&config);
        assert!(matches!(
            WorkerOpt::new(&config, &registry, None),
            Err(StrataError::ConfigError(_))
        ));
    }
}
