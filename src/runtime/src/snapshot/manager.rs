//! Snapshot manager.
//!
//! Snapshots live as full directory trees under `<root>/snapshots/<id>`,
//! with metadata in `<root>/metadata.db`. `<root>` must be served by a union
//! mount from the configured provider.
//!
//! Every mutating operation holds one metadata write transaction across its
//! disk work, ordered so that a crash leaves at worst an unreferenced
//! directory or a live snapshot's directory parked at `rm-<id>`, which
//! cleanup moves back. Metadata never points at a directory that is gone.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use strata_core::error::{Result, StrataError};
use strata_core::snapshot::{Info, Kind, MountSpec, Snapshot, SnapshotOpts, Usage};

use super::metastore::{MetaStore, WriteTxn};
use super::staging::StagingArea;
use crate::fs;
use crate::metrics::{MetricsCollector, Operation, SnapshotMetrics};
use crate::mount::{UnionMount, UnionMountProvider};

const SNAPSHOTS_DIR: &str = "snapshots";
const METADATA_FILE: &str = "metadata.db";

/// Result of [`Snapshotter::cleanup`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Directories deleted
    pub removed: Vec<PathBuf>,
    /// Space they occupied
    pub reclaimed: Usage,
    /// Snapshot directories moved back out of quarantine
    pub restored: Vec<PathBuf>,
}

/// A live snapshot whose directory is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingDirectory {
    pub name: String,
    pub id: String,
}

/// Result of [`Snapshotter::check`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    /// Number of snapshots in the metadata store
    pub snapshots: usize,
    pub missing: Vec<MissingDirectory>,
    /// Live snapshots whose directory sits at `rm-<id>` after an interrupted
    /// remove. Cleanup moves them back.
    pub quarantined: Vec<MissingDirectory>,
    /// Directories no snapshot references
    pub orphans: Vec<PathBuf>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.quarantined.is_empty() && self.orphans.is_empty()
    }
}

/// Classified entries of `snapshots/`.
#[derive(Debug, Default)]
struct DirScan {
    orphans: Vec<PathBuf>,
    /// (id, quarantine path) of live snapshots caught mid-remove
    quarantined: Vec<(String, PathBuf)>,
}

/// Layered snapshot manager over a union-mounted root.
///
/// Cheap to clone; clones share the same store and mount.
#[derive(Clone)]
pub struct Snapshotter {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    device: String,
    staging: StagingArea,
    store: MetaStore,
    mount: Mutex<Option<Box<dyn UnionMount>>>,
    metrics: MetricsCollector,
}

impl Snapshotter {
    /// Mount `root` with `provider` and open the snapshot store inside it.
    ///
    /// Blocks until the union mount is ready. Fails with `MountUnavailable`
    /// if the mount cannot be established or verified.
    pub fn new(root: impl AsRef<Path>, provider: &dyn UnionMountProvider) -> Result<Self> {
        let mut mount = provider.mount(root.as_ref())?;

        match Inner::open(mount.as_ref()) {
            Ok((root, device, staging, store)) => {
                tracing::info!(
                    root = %root.display(),
                    device = %device,
                    provider = provider.name(),
                    "Snapshotter ready"
                );
                Ok(Self {
                    inner: Arc::new(Inner {
                        root,
                        device,
                        staging,
                        store,
                        mount: Mutex::new(Some(mount)),
                        metrics: MetricsCollector::new(),
                    }),
                })
            }
            Err(e) => {
                if let Err(unmount_err) = mount.unmount() {
                    tracing::warn!(error = %unmount_err, "Failed to unmount after open failure");
                }
                Err(e)
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Source of the union mount backing the root.
    pub fn device(&self) -> &str {
        &self.inner.device
    }

    pub fn metrics(&self) -> SnapshotMetrics {
        self.inner.metrics.snapshot()
    }

    /// Run `f` on the blocking pool. The closure finishes even if the
    /// returned future is dropped.
    async fn blocking<T, F>(&self, span: tracing::Span, f: F) -> Result<T>
    where
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || span.in_scope(|| f(&inner)))
            .await
            .map_err(|e| StrataError::Other(format!("snapshot task failed: {}", e)))?
    }

    pub async fn stat(&self, key: &str) -> Result<Info> {
        let key = key.to_string();
        let span = tracing::debug_span!("stat", key = %key);
        self.blocking(span, move |inner| {
            let txn = inner.store.begin_read()?;
            let (_, info, _) = txn.get_info(&key)?;
            Ok(info)
        })
        .await
    }

    /// Patch mutable fields (labels) of an existing snapshot.
    pub async fn update(&self, info: Info, fieldpaths: &[String]) -> Result<Info> {
        let fieldpaths = fieldpaths.to_vec();
        let span = tracing::debug_span!("update", key = %info.name);
        self.blocking(span, move |inner| inner.update(&info, &fieldpaths))
            .await
    }

    pub async fn usage(&self, key: &str) -> Result<Usage> {
        let key = key.to_string();
        let span = tracing::debug_span!("usage", key = %key);
        self.blocking(span, move |inner| inner.usage(&key)).await
    }

    /// Create a writable snapshot holding a copy of `parent`.
    pub async fn prepare(
        &self,
        key: &str,
        parent: Option<&str>,
        opts: SnapshotOpts,
    ) -> Result<Vec<MountSpec>> {
        self.create(Kind::Active, key, parent, opts).await
    }

    /// Create a read-only snapshot over `parent`.
    pub async fn view(
        &self,
        key: &str,
        parent: Option<&str>,
        opts: SnapshotOpts,
    ) -> Result<Vec<MountSpec>> {
        self.create(Kind::View, key, parent, opts).await
    }

    async fn create(
        &self,
        kind: Kind,
        key: &str,
        parent: Option<&str>,
        opts: SnapshotOpts,
    ) -> Result<Vec<MountSpec>> {
        let key = key.to_string();
        let parent = parent.filter(|p| !p.is_empty()).map(str::to_string);
        let span = tracing::info_span!("create", kind = %kind, key = %key);
        self.blocking(span, move |inner| {
            inner.create_snapshot(kind, &key, parent.as_deref(), &opts)
        })
        .await
    }

    /// Mount descriptors of an existing active or view snapshot.
    pub async fn mounts(&self, key: &str) -> Result<Vec<MountSpec>> {
        let key = key.to_string();
        let span = tracing::debug_span!("mounts", key = %key);
        self.blocking(span, move |inner| inner.mounts(&key)).await
    }

    /// Finalize active snapshot `key` as committed snapshot `name`.
    pub async fn commit(&self, name: &str, key: &str, opts: SnapshotOpts) -> Result<()> {
        let name = name.to_string();
        let key = key.to_string();
        let span = tracing::info_span!("commit", key = %key, name = %name);
        self.blocking(span, move |inner| inner.commit(&name, &key, &opts))
            .await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        let span = tracing::info_span!("remove", key = %key);
        self.blocking(span, move |inner| inner.remove(&key)).await
    }

    /// Visit every committed snapshot. An error from `visit` stops the walk.
    pub async fn walk<F>(&self, visit: F) -> Result<()>
    where
        F: FnMut(&Info) -> Result<()>,
    {
        self.walk_filtered(Some(Kind::Committed), visit).await
    }

    /// Visit every snapshot regardless of kind.
    pub async fn walk_all<F>(&self, visit: F) -> Result<()>
    where
        F: FnMut(&Info) -> Result<()>,
    {
        self.walk_filtered(None, visit).await
    }

    async fn walk_filtered<F>(&self, kind: Option<Kind>, mut visit: F) -> Result<()>
    where
        F: FnMut(&Info) -> Result<()>,
    {
        let span = tracing::debug_span!("walk");
        let infos = self
            .blocking(span, move |inner| {
                let txn = inner.store.begin_read()?;
                Ok(txn
                    .records()?
                    .into_iter()
                    .filter(|(_, record)| kind.map_or(true, |k| record.kind == k))
                    .map(|(name, record)| record.info(&name))
                    .collect::<Vec<_>>())
            })
            .await?;

        for info in &infos {
            visit(info)?;
        }
        Ok(())
    }

    /// Delete staging leftovers and directories without metadata. A live
    /// snapshot's directory left in quarantine by an interrupted remove is
    /// moved back instead.
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        let span = tracing::info_span!("cleanup");
        self.blocking(span, |inner| inner.cleanup()).await
    }

    /// Like [`cleanup`](Self::cleanup), then run `f` over every snapshot
    /// while still holding the metadata writer lock, so no snapshot can be
    /// created or relabeled until `f` returns.
    pub async fn cleanup_with<T, F>(&self, f: F) -> Result<(CleanupReport, T)>
    where
        F: FnOnce(&[Info]) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let span = tracing::info_span!("cleanup");
        self.blocking(span, move |inner| inner.cleanup_with(f)).await
    }

    /// Compare metadata with the directories on disk. Changes nothing.
    pub async fn check(&self) -> Result<CheckReport> {
        let span = tracing::debug_span!("check");
        self.blocking(span, |inner| inner.check()).await
    }

    /// Close the metadata store and detach the union mount. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let span = tracing::info_span!("close");
        self.blocking(span, |inner| inner.close()).await
    }
}

impl Inner {
    fn open(mount: &dyn UnionMount) -> Result<(PathBuf, String, StagingArea, MetaStore)> {
        let root = mount.target().to_path_buf();
        let info = mount.info()?;

        let snapshots = root.join(SNAPSHOTS_DIR);
        std::fs::create_dir_all(&snapshots).map_err(|e| {
            StrataError::IoError(std::io::Error::new(
                e.kind(),
                format!("failed to create {}: {}", snapshots.display(), e),
            ))
        })?;

        let store = MetaStore::open(root.join(METADATA_FILE))?;
        Ok((root, info.source, StagingArea::new(snapshots), store))
    }

    fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.staging.snapshot_dir(id)
    }

    fn rollback(&self, txn: WriteTxn) {
        if let Err(e) = txn.rollback() {
            tracing::warn!(error = %e, "Failed to roll back metadata transaction");
        }
    }

    fn update(&self, info: &Info, fieldpaths: &[String]) -> Result<Info> {
        let txn = self.store.begin_write()?;
        match txn.update_info(info, fieldpaths) {
            Ok(updated) => {
                txn.commit()?;
                Ok(updated)
            }
            Err(e) => {
                self.rollback(txn);
                Err(e)
            }
        }
    }

    fn usage(&self, key: &str) -> Result<Usage> {
        let txn = self.store.begin_read()?;
        let (id, info, usage) = txn.get_info(key)?;
        if info.kind != Kind::Active {
            return Ok(usage);
        }
        let dir = self.snapshot_dir(&id);
        fs::disk_usage(&dir).map_err(|e| usage_error(&id, &dir, e))
    }

    fn create_snapshot(
        &self,
        kind: Kind,
        key: &str,
        parent: Option<&str>,
        opts: &SnapshotOpts,
    ) -> Result<Vec<MountSpec>> {
        let op = if kind == Kind::Active {
            Operation::Prepare
        } else {
            Operation::View
        };
        let result = self.try_create(kind, key, parent, opts);
        self.metrics.record(op, &result);
        result
    }

    fn try_create(
        &self,
        kind: Kind,
        key: &str,
        parent: Option<&str>,
        opts: &SnapshotOpts,
    ) -> Result<Vec<MountSpec>> {
        let txn = self.store.begin_write()?;

        let (snapshot, linked) = match self.link_snapshot(&txn, kind, key, parent, opts) {
            Ok(linked) => linked,
            Err(e) => {
                self.rollback(txn);
                return Err(e);
            }
        };

        if let Err(e) = txn.commit() {
            if let Some(path) = linked {
                remove_tree_logged(&path);
            }
            return Err(e);
        }

        tracing::debug!(id = %snapshot.id, parent = ?parent, "Created snapshot");
        Ok(mounts_for(&self.staging, &snapshot))
    }

    /// Steps 2 to 5 of the staging protocol: allocate staging, insert the
    /// record, copy the parent, rename into place. Returns the final path
    /// when a directory was linked.
    fn link_snapshot(
        &self,
        txn: &WriteTxn,
        kind: Kind,
        key: &str,
        parent: Option<&str>,
        opts: &SnapshotOpts,
    ) -> Result<(Snapshot, Option<PathBuf>)> {
        let needs_dir = kind == Kind::Active || parent.is_none();
        let staging = if needs_dir {
            Some(self.staging.allocate()?)
        } else {
            None
        };

        let snapshot = txn.create_snapshot(kind, key, parent, opts)?;

        let Some(staging) = staging else {
            return Ok((snapshot, None));
        };

        if let Some(parent_id) = snapshot.parent_ids.first() {
            let parent_dir = self.snapshot_dir(parent_id);
            if !parent_dir.is_dir() {
                return Err(StrataError::Inconsistent {
                    id: parent_id.clone(),
                    message: format!("directory {} is missing", parent_dir.display()),
                });
            }
            let copied = fs::copy_dir(&parent_dir, staging.path())?;
            self.metrics.add_bytes_copied(copied);
            tracing::debug!(parent_id = %parent_id, bytes = copied, "Copied parent into staging");
        }

        let target = self.snapshot_dir(&snapshot.id);
        if std::fs::symlink_metadata(&target).is_ok() {
            // The id was never issued, so whatever sits here is crash debris
            tracing::warn!(id = %snapshot.id, path = %target.display(), "Replacing orphaned snapshot directory");
            remove_tree(&target)?;
        }
        staging.persist(&target)?;

        Ok((snapshot, Some(target)))
    }

    fn mounts(&self, key: &str) -> Result<Vec<MountSpec>> {
        let txn = self.store.begin_read()?;
        let snapshot = txn.get_snapshot(key)?;
        if snapshot.kind == Kind::Committed {
            return Err(StrataError::FailedPrecondition(format!(
                "snapshot {} is committed; mounts exist only for active and view snapshots",
                key
            )));
        }

        let mounts = mounts_for(&self.staging, &snapshot);
        for mount in &mounts {
            if !mount.source.is_dir() {
                return Err(StrataError::Inconsistent {
                    id: snapshot.id.clone(),
                    message: format!("mount source {} is missing", mount.source.display()),
                });
            }
        }
        Ok(mounts)
    }

    fn commit(&self, name: &str, key: &str, opts: &SnapshotOpts) -> Result<()> {
        let result = self.try_commit(name, key, opts);
        self.metrics.record(Operation::Commit, &result);
        result
    }

    fn try_commit(&self, name: &str, key: &str, opts: &SnapshotOpts) -> Result<()> {
        let txn = self.store.begin_write()?;
        match self.stage_commit(&txn, name, key, opts) {
            Ok(id) => {
                txn.commit()?;
                tracing::debug!(id = %id, "Committed snapshot");
                Ok(())
            }
            Err(e) => {
                self.rollback(txn);
                Err(e)
            }
        }
    }

    fn stage_commit(
        &self,
        txn: &WriteTxn,
        name: &str,
        key: &str,
        opts: &SnapshotOpts,
    ) -> Result<String> {
        let (id, info, _) = txn.get_info(key)?;
        if info.kind != Kind::Active {
            return Err(StrataError::FailedPrecondition(format!(
                "snapshot {} is {}, not active",
                key, info.kind
            )));
        }

        let dir = self.snapshot_dir(&id);
        let usage = fs::disk_usage(&dir).map_err(|e| usage_error(&id, &dir, e))?;

        txn.commit_active(key, name, usage, opts)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let result = self.try_remove(key);
        self.metrics.record(Operation::Remove, &result);
        result
    }

    fn try_remove(&self, key: &str) -> Result<()> {
        let txn = self.store.begin_write()?;

        let (id, owns_dir) = match txn.remove(key) {
            Ok(removed) => removed,
            Err(e) => {
                self.rollback(txn);
                return Err(e);
            }
        };

        let dir = self.snapshot_dir(&id);
        let quarantine = self.staging.quarantine_dir(&id);
        let renamed = if owns_dir {
            if let Err(e) = remove_tree(&quarantine) {
                self.rollback(txn);
                return Err(e);
            }
            match std::fs::rename(&dir, &quarantine) {
                Ok(()) => Some(quarantine),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(id = %id, path = %dir.display(), "Snapshot directory already gone");
                    None
                }
                Err(e) => {
                    self.rollback(txn);
                    return Err(StrataError::IoError(std::io::Error::new(
                        e.kind(),
                        format!(
                            "failed to quarantine {} to {}: {}",
                            dir.display(),
                            quarantine.display(),
                            e
                        ),
                    )));
                }
            }
        } else {
            None
        };

        if let Err(e) = txn.commit() {
            if let Some(quarantine) = &renamed {
                if let Err(restore_err) = std::fs::rename(quarantine, &dir) {
                    tracing::error!(
                        id = %id,
                        path = %quarantine.display(),
                        error = %restore_err,
                        "Failed to restore quarantined snapshot directory"
                    );
                }
            }
            return Err(e);
        }

        if let Some(quarantine) = renamed {
            remove_tree_logged(&quarantine);
        }
        tracing::debug!(id = %id, "Removed snapshot");
        Ok(())
    }

    /// Sort the entries of `snapshots/` against the live ids.
    ///
    /// `rm-<id>` belongs to a live snapshot when the remove that created it
    /// never committed; it is only garbage if `<id>` is gone from metadata
    /// or a directory already sits at `<id>`.
    fn scan_dirs(&self, live: &HashSet<String>) -> Result<DirScan> {
        let mut scan = DirScan::default();
        for entry in std::fs::read_dir(self.staging.dir())? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if let Some(id) = StagingArea::quarantined_id(name) {
                if live.contains(id) && !self.snapshot_dir(id).exists() {
                    scan.quarantined.push((id.to_string(), entry.path()));
                } else {
                    scan.orphans.push(entry.path());
                }
            } else if StagingArea::is_transient(name)
                || (StagingArea::is_snapshot_id(name) && !live.contains(name))
            {
                scan.orphans.push(entry.path());
            }
        }
        scan.orphans.sort();
        scan.quarantined.sort();
        Ok(scan)
    }

    fn cleanup(&self) -> Result<CleanupReport> {
        self.cleanup_with(|_| Ok(())).map(|(report, ())| report)
    }

    /// Sweep, then hand every snapshot to `f`, all under the writer lock.
    fn cleanup_with<T, F>(&self, f: F) -> Result<(CleanupReport, T)>
    where
        F: FnOnce(&[Info]) -> Result<T>,
    {
        // Holding the writer lock keeps new staging directories and new
        // labels from appearing until `f` is done
        let txn = self.store.begin_write()?;
        let result = self.sweep(&txn).and_then(|report| {
            let infos: Vec<Info> = txn
                .records()?
                .into_iter()
                .map(|(name, record)| record.info(&name))
                .collect();
            Ok((report, f(&infos)?))
        });
        self.rollback(txn);

        if let Ok((report, _)) = &result {
            self.metrics.add_orphans_removed(report.removed.len() as u64);
            tracing::info!(
                removed = report.removed.len(),
                restored = report.restored.len(),
                bytes = report.reclaimed.size,
                "Cleaned up snapshot directories"
            );
        }
        result
    }

    fn sweep(&self, txn: &WriteTxn) -> Result<CleanupReport> {
        let live = txn.live_ids()?;
        let scan = self.scan_dirs(&live)?;
        let mut report = CleanupReport::default();

        for (id, quarantine) in scan.quarantined {
            let dir = self.snapshot_dir(&id);
            match std::fs::rename(&quarantine, &dir) {
                Ok(()) => {
                    tracing::warn!(
                        id = %id,
                        path = %dir.display(),
                        "Restored snapshot directory from interrupted remove"
                    );
                    report.restored.push(dir);
                }
                Err(e) => {
                    tracing::warn!(
                        id = %id,
                        path = %quarantine.display(),
                        error = %e,
                        "Failed to restore quarantined snapshot directory"
                    );
                }
            }
        }

        for path in scan.orphans {
            let usage = fs::disk_usage(&path).unwrap_or_default();
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Removed orphaned directory");
                    report.reclaimed.add(usage);
                    report.removed.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove orphaned directory");
                }
            }
        }
        Ok(report)
    }

    fn check(&self) -> Result<CheckReport> {
        let txn = self.store.begin_read()?;
        let records = txn.records()?;
        drop(txn);

        let live: HashSet<String> = records
            .iter()
            .map(|(_, record)| record.id.to_string())
            .collect();
        let scan = self.scan_dirs(&live)?;
        let quarantined: HashSet<&str> =
            scan.quarantined.iter().map(|(id, _)| id.as_str()).collect();

        let mut report = CheckReport {
            snapshots: records.len(),
            orphans: scan.orphans.clone(),
            ..Default::default()
        };
        for (name, record) in &records {
            let id = record.id.to_string();
            if !record.has_directory() || self.snapshot_dir(&id).is_dir() {
                continue;
            }
            let entry = MissingDirectory {
                name: name.clone(),
                id: id.clone(),
            };
            if quarantined.contains(id.as_str()) {
                report.quarantined.push(entry);
            } else {
                report.missing.push(entry);
            }
        }
        Ok(report)
    }

    fn close(&self) -> Result<()> {
        if self.store.close() {
            tracing::info!(root = %self.root.display(), "Snapshotter closed");
        }
        let mount = self.mount.lock().take();
        if let Some(mut mount) = mount {
            mount.unmount()?;
        }
        Ok(())
    }
}

/// Bind mounts for `snapshot`: its own directory when it has one, else the
/// nearest parent's.
fn mounts_for(staging: &StagingArea, snapshot: &Snapshot) -> Vec<MountSpec> {
    let readonly = snapshot.kind != Kind::Active;
    let source = match snapshot.parent_ids.first() {
        Some(parent_id) if snapshot.kind == Kind::View => staging.snapshot_dir(parent_id),
        _ => staging.snapshot_dir(&snapshot.id),
    };
    vec![MountSpec::bind(source, readonly)]
}

fn usage_error(id: &str, dir: &Path, err: std::io::Error) -> StrataError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StrataError::Inconsistent {
            id: id.to_string(),
            message: format!("directory {} is missing", dir.display()),
        }
    } else {
        StrataError::IoError(std::io::Error::new(
            err.kind(),
            format!("failed to measure {}: {}", dir.display(), err),
        ))
    }
}

/// Remove a directory tree, treating a missing path as success.
fn remove_tree(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StrataError::IoError(std::io::Error::new(
            e.kind(),
            format!("failed to remove {}: {}", path.display(), e),
        ))),
    }
}

fn remove_tree_logged(path: &Path) {
    if let Err(e) = remove_tree(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to delete snapshot directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::NativeProvider;
    use tempfile::TempDir;

    fn open() -> (TempDir, Snapshotter) {
        let tmp = TempDir::new().unwrap();
        let sn = Snapshotter::new(tmp.path().join("root"), &NativeProvider::new()).unwrap();
        (tmp, sn)
    }

    #[tokio::test]
    async fn test_new_lays_out_root() {
        let (_tmp, sn) = open();
        assert!(sn.root().join(SNAPSHOTS_DIR).is_dir());
        assert!(sn.root().join(METADATA_FILE).is_file());
        assert!(!sn.device().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_returns_rw_bind_of_own_dir() {
        let (_tmp, sn) = open();
        let mounts = sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();

        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source, sn.root().join("snapshots").join("1"));
        assert_eq!(mounts[0].options, vec!["rw", "rbind"]);
        assert!(mounts[0].source.is_dir());
    }

    #[tokio::test]
    async fn test_view_over_parent_aliases_parent_dir() {
        let (_tmp, sn) = open();
        sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();
        sn.commit("base", "a", SnapshotOpts::new()).await.unwrap();

        let mounts = sn.view("v", Some("base"), SnapshotOpts::new()).await.unwrap();
        assert_eq!(mounts[0].source, sn.root().join("snapshots").join("1"));
        assert!(mounts[0].is_readonly());
        // Views over a parent get no directory of their own
        assert!(!sn.root().join("snapshots").join("2").exists());
    }

    #[tokio::test]
    async fn test_parentless_view_gets_own_dir() {
        let (_tmp, sn) = open();
        let mounts = sn.view("v", Some(""), SnapshotOpts::new()).await.unwrap();
        assert_eq!(mounts[0].source, sn.root().join("snapshots").join("1"));
        assert!(mounts[0].source.is_dir());
        assert!(mounts[0].is_readonly());
    }

    #[tokio::test]
    async fn test_crash_between_rename_and_commit_leaves_unreferenced_orphan() {
        let (_tmp, sn) = open();
        let inner = &sn.inner;

        // Run the protocol up to the rename, then "crash" by dropping the txn
        let txn = inner.store.begin_write().unwrap();
        let (snapshot, linked) = inner
            .link_snapshot(&txn, Kind::Active, "a", None, &SnapshotOpts::new())
            .unwrap();
        drop(txn);

        let orphan = linked.unwrap();
        assert!(orphan.is_dir());
        std::fs::write(orphan.join("stale"), "debris").unwrap();

        assert!(sn.stat("a").await.unwrap_err().is_not_found());
        let report = sn.check().await.unwrap();
        assert_eq!(report.orphans, vec![orphan.clone()]);
        assert!(report.missing.is_empty());

        // The id is reissued and the debris replaced with a clean directory
        let mounts = sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();
        assert_eq!(mounts[0].source, inner.snapshot_dir(&snapshot.id));
        assert!(!mounts[0].source.join("stale").exists());
        assert!(sn.check().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_cleanup_removes_orphans_only() {
        let (_tmp, sn) = open();
        sn.prepare("live", None, SnapshotOpts::new()).await.unwrap();

        let snapshots = sn.root().join("snapshots");
        std::fs::create_dir(snapshots.join("new-deadbeef")).unwrap();
        std::fs::create_dir(snapshots.join("rm-9")).unwrap();
        std::fs::create_dir(snapshots.join("42")).unwrap();
        std::fs::write(snapshots.join("42").join("f"), "12345").unwrap();

        let report = sn.cleanup().await.unwrap();
        assert_eq!(report.removed.len(), 3);
        assert_eq!(report.reclaimed.size, 5);
        assert!(snapshots.join("1").is_dir());
        assert!(!snapshots.join("42").exists());
        assert_eq!(sn.metrics().orphans_removed, 3);
        assert!(sn.check().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_cleanup_restores_directory_of_interrupted_remove() {
        let (_tmp, sn) = open();
        let mounts = sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();
        std::fs::write(mounts[0].source.join("data"), "layer").unwrap();
        sn.commit("layer1", "a", SnapshotOpts::new()).await.unwrap();

        // Crash after the quarantine rename, before the metadata commit
        let snapshots = sn.root().join("snapshots");
        std::fs::rename(snapshots.join("1"), snapshots.join("rm-1")).unwrap();

        let report = sn.check().await.unwrap();
        assert!(report.orphans.is_empty());
        assert!(report.missing.is_empty());
        assert_eq!(
            report.quarantined,
            vec![MissingDirectory {
                name: "layer1".to_string(),
                id: "1".to_string()
            }]
        );
        assert!(!report.is_clean());

        let cleaned = sn.cleanup().await.unwrap();
        assert!(cleaned.removed.is_empty());
        assert_eq!(cleaned.restored, vec![snapshots.join("1")]);
        assert!(!snapshots.join("rm-1").exists());
        assert_eq!(
            std::fs::read_to_string(snapshots.join("1").join("data")).unwrap(),
            "layer"
        );
        assert!(sn.check().await.unwrap().is_clean());

        let child = sn.prepare("b", Some("layer1"), SnapshotOpts::new()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(child[0].source.join("data")).unwrap(),
            "layer"
        );
    }

    #[tokio::test]
    async fn test_quarantine_next_to_live_directory_is_orphan() {
        let (_tmp, sn) = open();
        sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();
        let snapshots = sn.root().join("snapshots");
        std::fs::create_dir(snapshots.join("rm-1")).unwrap();

        let report = sn.check().await.unwrap();
        assert_eq!(report.orphans, vec![snapshots.join("rm-1")]);
        assert!(report.quarantined.is_empty());

        let cleaned = sn.cleanup().await.unwrap();
        assert_eq!(cleaned.removed, vec![snapshots.join("rm-1")]);
        assert!(cleaned.restored.is_empty());
        assert!(snapshots.join("1").is_dir());
    }

    #[tokio::test]
    async fn test_cleanup_leaves_names_that_are_not_ids() {
        let (_tmp, sn) = open();
        let snapshots = sn.root().join("snapshots");
        for name in ["+5", "007", "lost+found"] {
            std::fs::create_dir(snapshots.join(name)).unwrap();
        }

        let cleaned = sn.cleanup().await.unwrap();
        assert!(cleaned.removed.is_empty());
        for name in ["+5", "007", "lost+found"] {
            assert!(snapshots.join(name).is_dir(), "{} was removed", name);
        }
        assert!(sn.check().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_check_reports_missing_directory() {
        let (_tmp, sn) = open();
        sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();
        std::fs::remove_dir_all(sn.root().join("snapshots").join("1")).unwrap();

        let report = sn.check().await.unwrap();
        assert_eq!(
            report.missing,
            vec![MissingDirectory {
                name: "a".to_string(),
                id: "1".to_string()
            }]
        );
        assert!(matches!(
            sn.mounts("a").await,
            Err(StrataError::Inconsistent { .. })
        ));
        assert!(matches!(
            sn.usage("a").await,
            Err(StrataError::Inconsistent { .. })
        ));
    }

    #[tokio::test]
    async fn test_commit_with_missing_directory_stays_active() {
        let (_tmp, sn) = open();
        sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();
        std::fs::remove_dir_all(sn.root().join("snapshots").join("1")).unwrap();

        let err = sn.commit("layer", "a", SnapshotOpts::new()).await.unwrap_err();
        assert!(matches!(err, StrataError::Inconsistent { .. }));
        assert_eq!(sn.stat("a").await.unwrap().kind, Kind::Active);
        assert!(sn.stat("layer").await.unwrap_err().is_not_found());
        assert_eq!(sn.metrics().failed, 1);
    }

    #[tokio::test]
    async fn test_remove_tolerates_missing_directory() {
        let (_tmp, sn) = open();
        sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();
        std::fs::remove_dir_all(sn.root().join("snapshots").join("1")).unwrap();

        sn.remove("a").await.unwrap();
        assert!(sn.stat("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_failed_copy_rolls_back() {
        let (_tmp, sn) = open();
        sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();
        sn.commit("base", "a", SnapshotOpts::new()).await.unwrap();
        std::fs::remove_dir_all(sn.root().join("snapshots").join("1")).unwrap();

        let err = sn
            .prepare("b", Some("base"), SnapshotOpts::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Inconsistent { .. }));
        assert!(sn.stat("b").await.unwrap_err().is_not_found());

        // No staging directory survives the failure
        let leftovers: Vec<_> = std::fs::read_dir(sn.root().join("snapshots"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let (_tmp, sn) = open();
        sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();

        sn.close().await.unwrap();
        sn.close().await.unwrap();

        assert!(matches!(sn.stat("a").await, Err(StrataError::Closed)));
        assert!(matches!(
            sn.prepare("b", None, SnapshotOpts::new()).await,
            Err(StrataError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_metrics_count_operations() {
        let (_tmp, sn) = open();
        sn.prepare("a", None, SnapshotOpts::new()).await.unwrap();
        std::fs::write(sn.root().join("snapshots/1/f"), "abc").unwrap();
        sn.commit("base", "a", SnapshotOpts::new()).await.unwrap();
        sn.prepare("b", Some("base"), SnapshotOpts::new()).await.unwrap();
        sn.view("v", Some("base"), SnapshotOpts::new()).await.unwrap();
        sn.remove("b").await.unwrap();
        let _ = sn.remove("b").await;

        let metrics = sn.metrics();
        assert_eq!(metrics.prepared, 2);
        assert_eq!(metrics.viewed, 1);
        assert_eq!(metrics.committed, 1);
        assert_eq!(metrics.removed, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.bytes_copied, 3);
    }
}
