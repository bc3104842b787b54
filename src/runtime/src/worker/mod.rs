//! Worker - snapshotter, content store, and executor assembled over one root.

mod executor;
mod opt;

pub use executor::{BuildStep, Executor};
pub use opt::{WorkerOpt, LABEL_EXECUTOR, LABEL_HOSTNAME, LABEL_SNAPSHOTTER};

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use strata_core::error::{Result, StrataError};
use strata_core::snapshot::{Info, SnapshotOpts, LABEL_GC_REF_CONTENT};

use crate::content::{BlobInfo, ContentStore};
use crate::snapshot::{CleanupReport, Snapshotter};

/// Slack for file timestamps, which come from a coarser clock than
/// `SystemTime::now()`.
const GC_MTIME_SLACK: Duration = Duration::from_secs(1);

/// Result of [`Worker::garbage_collect`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct GcReport {
    pub snapshots: CleanupReport,
    pub blobs_removed: Vec<BlobInfo>,
    /// Bytes freed across directories and blobs
    pub bytes_reclaimed: u64,
}

#[derive(Clone)]
pub struct Worker {
    opt: WorkerOpt,
}

impl Worker {
    pub fn new(opt: WorkerOpt) -> Self {
        Self { opt }
    }

    pub fn id(&self) -> &str {
        &self.opt.id
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.opt.labels
    }

    pub fn root(&self) -> &Path {
        &self.opt.root
    }

    pub fn snapshotter(&self) -> &Snapshotter {
        &self.opt.snapshotter
    }

    pub fn content(&self) -> &ContentStore {
        &self.opt.content
    }

    /// Prepare, execute, and commit one step. The active snapshot is removed
    /// if execution or commit fails.
    pub async fn exec_step(&self, step: &BuildStep) -> Result<Info> {
        let executor = self
            .opt
            .executor
            .as_ref()
            .ok_or_else(|| StrataError::ExecutorError("no executor configured".to_string()))?;
        let snapshotter = &self.opt.snapshotter;

        let mounts = snapshotter
            .prepare(&step.key, step.parent.as_deref(), SnapshotOpts::new())
            .await?;

        let outcome = match executor.run(step, &mounts).await {
            Ok(()) => {
                let opts = SnapshotOpts {
                    labels: step.labels.clone(),
                };
                snapshotter.commit(&step.name, &step.key, opts).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            tracing::warn!(key = %step.key, error = %e, "Build step failed");
            if let Err(rm) = snapshotter.remove(&step.key).await {
                tracing::warn!(key = %step.key, error = %rm, "Failed to remove failed step snapshot");
            }
            return Err(e);
        }

        snapshotter.stat(&step.name).await
    }

    /// Remove orphaned snapshot directories, then every blob no snapshot
    /// references through a `strata.io/gc.ref.content` label.
    ///
    /// The metadata writer lock is held from the snapshot sweep through the
    /// blob prune, so no label can be added in between. Blobs and ingest
    /// files written since collection started are kept.
    pub async fn garbage_collect(&self) -> Result<GcReport> {
        let cutoff = SystemTime::now()
            .checked_sub(GC_MTIME_SLACK)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let content = Arc::clone(&self.opt.content);

        let (snapshots, blobs_removed) = self
            .opt
            .snapshotter
            .cleanup_with(move |infos| {
                let keep: HashSet<String> = infos.iter().flat_map(content_refs).collect();
                content.prune(&keep, cutoff)
            })
            .await?;

        let bytes_reclaimed =
            snapshots.reclaimed.size + blobs_removed.iter().map(|b| b.size).sum::<u64>();
        tracing::info!(
            directories = snapshots.removed.len(),
            blobs = blobs_removed.len(),
            bytes = bytes_reclaimed,
            "Garbage collection finished"
        );

        Ok(GcReport {
            snapshots,
            blobs_removed,
            bytes_reclaimed,
        })
    }

    pub async fn close(&self) -> Result<()> {
        self.opt.snapshotter.close().await
    }
}

/// Digests referenced by `info`: the `strata.io/gc.ref.content` label and
/// any `strata.io/gc.ref.content.<suffix>` variants.
fn content_refs(info: &Info) -> impl Iterator<Item = String> + '_ {
    info.labels.iter().filter_map(|(key, value)| {
        let matches = key == LABEL_GC_REF_CONTENT
            || key
                .strip_prefix(LABEL_GC_REF_CONTENT)
                .is_some_and(|rest| rest.starts_with('.'));
        matches.then(|| value.clone())
    })
}
