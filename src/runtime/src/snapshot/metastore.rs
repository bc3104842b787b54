//! Transactional snapshot metadata backed by redb.
//!
//! Three tables:
//! - `snapshots`: key or committed name -> JSON [`SnapshotRecord`]
//! - `parents`: `(parent_id, child_id)` index used to refuse removing parents
//! - `meta`: the `next_id` counter
//!
//! Ids are decimal strings of a monotonic counter. An id is consumed only
//! when the transaction that allocated it commits.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use strata_core::error::{Result, StrataError};
use strata_core::snapshot::{Info, Kind, Snapshot, SnapshotOpts, Usage};

const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");
const PARENTS: TableDefinition<(u64, u64), ()> = TableDefinition::new("parents");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_ID_KEY: &str = "next_id";

/// Persisted form of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: u64,
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Recorded at commit; zero for active and view snapshots
    #[serde(default)]
    pub usage: Usage,
}

impl SnapshotRecord {
    pub fn info(&self, name: &str) -> Info {
        Info {
            name: name.to_string(),
            parent: self.parent.clone(),
            kind: self.kind,
            labels: self.labels.clone(),
            created: self.created,
            updated: self.updated,
        }
    }

    /// Whether this snapshot owns a directory under `snapshots/`.
    ///
    /// Views over a parent reuse the parent's directory.
    pub fn has_directory(&self) -> bool {
        self.kind != Kind::View || self.parent.is_none()
    }
}

/// Handle on the metadata database.
pub struct MetaStore {
    path: PathBuf,
    db: RwLock<Option<Arc<Database>>>,
}

impl MetaStore {
    /// Create or open the database at `path`, initializing all tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(|e| StrataError::transaction("open", e))?;

        let txn = db
            .begin_write()
            .map_err(|e| StrataError::transaction("begin_write", e))?;
        {
            txn.open_table(SNAPSHOTS)
                .map_err(|e| StrataError::transaction("open_table", e))?;
            txn.open_table(PARENTS)
                .map_err(|e| StrataError::transaction("open_table", e))?;
            txn.open_table(META)
                .map_err(|e| StrataError::transaction("open_table", e))?;
        }
        txn.commit()
            .map_err(|e| StrataError::transaction("commit", e))?;

        tracing::debug!(path = %path.display(), "Opened snapshot metadata store");

        Ok(Self {
            path,
            db: RwLock::new(Some(Arc::new(db))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn db(&self) -> Result<Arc<Database>> {
        self.db.read().clone().ok_or(StrataError::Closed)
    }

    pub fn begin_read(&self) -> Result<ReadTxn> {
        let db = self.db()?;
        let txn = db
            .begin_read()
            .map_err(|e| StrataError::transaction("begin_read", e))?;
        Ok(ReadTxn { txn, _db: db })
    }

    /// Start a write transaction. Blocks while another writer is active.
    pub fn begin_write(&self) -> Result<WriteTxn> {
        let db = self.db()?;
        let txn = db
            .begin_write()
            .map_err(|e| StrataError::transaction("begin_write", e))?;
        Ok(WriteTxn { txn, _db: db })
    }

    /// Release the database. Open transactions keep it alive until they end.
    /// Returns false if the store was already closed.
    pub fn close(&self) -> bool {
        let was_open = self.db.write().take().is_some();
        if was_open {
            tracing::debug!(path = %self.path.display(), "Closed snapshot metadata store");
        }
        was_open
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }
}

/// Read-only transaction with a consistent view of the metadata.
pub struct ReadTxn {
    txn: redb::ReadTransaction,
    _db: Arc<Database>,
}

impl ReadTxn {
    fn snapshots(&self) -> Result<redb::ReadOnlyTable<&'static str, &'static [u8]>> {
        self.txn
            .open_table(SNAPSHOTS)
            .map_err(|e| StrataError::transaction("open_table", e))
    }

    /// Returns the id, public info, and recorded usage for `key`.
    pub fn get_info(&self, key: &str) -> Result<(String, Info, Usage)> {
        let table = self.snapshots()?;
        let record = require_record(&table, key)?;
        Ok((record.id.to_string(), record.info(key), record.usage))
    }

    pub fn get_snapshot(&self, key: &str) -> Result<Snapshot> {
        let table = self.snapshots()?;
        let record = require_record(&table, key)?;
        resolve_snapshot(&table, &record)
    }

    pub fn get_record(&self, key: &str) -> Result<Option<SnapshotRecord>> {
        let table = self.snapshots()?;
        load_record(&table, key)
    }

    /// All records keyed by name, in key order.
    pub fn records(&self) -> Result<Vec<(String, SnapshotRecord)>> {
        let table = self.snapshots()?;
        scan(&table)
    }
}

/// Read-write transaction. Dropping it without [`WriteTxn::commit`] rolls back.
pub struct WriteTxn {
    txn: redb::WriteTransaction,
    _db: Arc<Database>,
}

impl WriteTxn {
    fn snapshots(&self) -> Result<redb::Table<'_, &'static str, &'static [u8]>> {
        self.txn
            .open_table(SNAPSHOTS)
            .map_err(|e| StrataError::transaction("open_table", e))
    }

    fn parents(&self) -> Result<redb::Table<'_, (u64, u64), ()>> {
        self.txn
            .open_table(PARENTS)
            .map_err(|e| StrataError::transaction("open_table", e))
    }

    pub fn get_info(&self, key: &str) -> Result<(String, Info, Usage)> {
        let table = self.snapshots()?;
        let record = require_record(&table, key)?;
        Ok((record.id.to_string(), record.info(key), record.usage))
    }

    pub fn get_snapshot(&self, key: &str) -> Result<Snapshot> {
        let table = self.snapshots()?;
        let record = require_record(&table, key)?;
        resolve_snapshot(&table, &record)
    }

    /// All records keyed by name, in key order.
    pub fn records(&self) -> Result<Vec<(String, SnapshotRecord)>> {
        let table = self.snapshots()?;
        scan(&table)
    }

    /// Ids of every snapshot recorded in this transaction's view.
    pub fn live_ids(&self) -> Result<HashSet<String>> {
        let table = self.snapshots()?;
        Ok(scan(&table)?
            .into_iter()
            .map(|(_, record)| record.id.to_string())
            .collect())
    }

    fn allocate_id(&self) -> Result<u64> {
        let mut meta = self
            .txn
            .open_table(META)
            .map_err(|e| StrataError::transaction("open_table", e))?;
        let next = meta
            .get(NEXT_ID_KEY)
            .map_err(|e| StrataError::transaction("get", e))?
            .map(|v| v.value())
            .unwrap_or(1);
        meta.insert(NEXT_ID_KEY, next + 1)
            .map_err(|e| StrataError::transaction("insert", e))?;
        Ok(next)
    }

    /// Insert a new active or view record and allocate its id.
    ///
    /// The parent, when given, must exist and be committed.
    pub fn create_snapshot(
        &self,
        kind: Kind,
        key: &str,
        parent: Option<&str>,
        opts: &SnapshotOpts,
    ) -> Result<Snapshot> {
        if key.is_empty() {
            return Err(StrataError::InvalidArgument(
                "snapshot key must not be empty".to_string(),
            ));
        }
        if kind == Kind::Committed {
            return Err(StrataError::InvalidArgument(
                "cannot create a committed snapshot directly".to_string(),
            ));
        }

        let id = self.allocate_id()?;
        let mut table = self.snapshots()?;

        if load_record(&table, key)?.is_some() {
            return Err(StrataError::AlreadyExists(format!("snapshot {}", key)));
        }

        let mut parent_ids = Vec::new();
        let mut parent_id = None;
        if let Some(parent) = parent {
            let parent_record = load_record(&table, parent)?
                .ok_or_else(|| StrataError::NotFound(format!("parent snapshot {}", parent)))?;
            if parent_record.kind != Kind::Committed {
                return Err(StrataError::FailedPrecondition(format!(
                    "parent snapshot {} is {}, not committed",
                    parent, parent_record.kind
                )));
            }
            parent_ids = resolve_snapshot(&table, &parent_record)?.parent_ids;
            parent_ids.insert(0, parent_record.id.to_string());
            parent_id = Some(parent_record.id);
        }

        let now = Utc::now();
        let record = SnapshotRecord {
            id,
            kind,
            parent: parent.map(str::to_string),
            labels: opts.labels.clone(),
            created: now,
            updated: now,
            usage: Usage::default(),
        };
        store_record(&mut table, key, &record)?;

        if let Some(pid) = parent_id {
            let mut parents = self.parents()?;
            parents
                .insert((pid, id), ())
                .map_err(|e| StrataError::transaction("insert", e))?;
        }

        Ok(Snapshot {
            id: id.to_string(),
            kind,
            parent_ids,
        })
    }

    /// Apply `fieldpaths` of `info` to the stored record.
    ///
    /// An empty list or `labels` replaces every label; `labels.<k>` sets or
    /// removes a single label. Other fields are immutable.
    pub fn update_info(&self, info: &Info, fieldpaths: &[String]) -> Result<Info> {
        let mut table = self.snapshots()?;
        let mut record = require_record(&table, &info.name)?;

        if fieldpaths.is_empty() {
            record.labels = info.labels.clone();
        }
        for path in fieldpaths {
            if path == "labels" {
                record.labels = info.labels.clone();
            } else if let Some(label) = path.strip_prefix("labels.") {
                match info.labels.get(label) {
                    Some(value) => {
                        record.labels.insert(label.to_string(), value.clone());
                    }
                    None => {
                        record.labels.remove(label);
                    }
                }
            } else {
                return Err(StrataError::InvalidArgument(format!(
                    "cannot update field {:?} of snapshot {}",
                    path, info.name
                )));
            }
        }

        record.updated = Utc::now();
        store_record(&mut table, &info.name, &record)?;
        Ok(record.info(&info.name))
    }

    /// Convert the active snapshot `key` into committed snapshot `name`,
    /// preserving its id. Returns the id.
    pub fn commit_active(
        &self,
        key: &str,
        name: &str,
        usage: Usage,
        opts: &SnapshotOpts,
    ) -> Result<String> {
        if name.is_empty() {
            return Err(StrataError::InvalidArgument(
                "commit name must not be empty".to_string(),
            ));
        }

        let mut table = self.snapshots()?;
        let mut record = require_record(&table, key)?;
        if record.kind != Kind::Active {
            return Err(StrataError::FailedPrecondition(format!(
                "snapshot {} is {}, not active",
                key, record.kind
            )));
        }
        if load_record(&table, name)?.is_some() {
            return Err(StrataError::AlreadyExists(format!("snapshot {}", name)));
        }

        record.kind = Kind::Committed;
        record.usage = usage;
        record.updated = Utc::now();
        record
            .labels
            .extend(opts.labels.iter().map(|(k, v)| (k.clone(), v.clone())));

        table
            .remove(key)
            .map_err(|e| StrataError::transaction("remove", e))?;
        store_record(&mut table, name, &record)?;

        Ok(record.id.to_string())
    }

    /// Delete the record for `key`. Returns its id and whether it owns a
    /// directory. Snapshots with children cannot be removed.
    pub fn remove(&self, key: &str) -> Result<(String, bool)> {
        let mut table = self.snapshots()?;
        let record = require_record(&table, key)?;

        let mut parents = self.parents()?;
        let has_children = parents
            .range((record.id, 0u64)..=(record.id, u64::MAX))
            .map_err(|e| StrataError::transaction("range", e))?
            .next()
            .is_some();
        if has_children {
            return Err(StrataError::FailedPrecondition(format!(
                "cannot remove snapshot {} with children",
                key
            )));
        }

        if let Some(parent) = &record.parent {
            if let Some(parent_record) = load_record(&table, parent)? {
                parents
                    .remove((parent_record.id, record.id))
                    .map_err(|e| StrataError::transaction("remove", e))?;
            }
        }

        table
            .remove(key)
            .map_err(|e| StrataError::transaction("remove", e))?;

        Ok((record.id.to_string(), record.has_directory()))
    }

    pub fn commit(self) -> Result<()> {
        self.txn
            .commit()
            .map_err(|e| StrataError::transaction("commit", e))
    }

    pub fn rollback(self) -> Result<()> {
        self.txn
            .abort()
            .map_err(|e| StrataError::transaction("rollback", e))
    }
}

fn load_record<T>(table: &T, key: &str) -> Result<Option<SnapshotRecord>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table
        .get(key)
        .map_err(|e| StrataError::transaction("get", e))?
    {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn require_record<T>(table: &T, key: &str) -> Result<SnapshotRecord>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    load_record(table, key)?.ok_or_else(|| StrataError::NotFound(format!("snapshot {}", key)))
}

fn store_record(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
    record: &SnapshotRecord,
) -> Result<()> {
    let bytes = serde_json::to_vec(record)?;
    table
        .insert(key, bytes.as_slice())
        .map_err(|e| StrataError::transaction("insert", e))?;
    Ok(())
}

/// Build the storage view of `record`, following parent names to ids.
fn resolve_snapshot<T>(table: &T, record: &SnapshotRecord) -> Result<Snapshot>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut parent_ids = Vec::new();
    let mut next = record.parent.clone();
    while let Some(name) = next {
        let parent = load_record(table, &name)?.ok_or_else(|| StrataError::Inconsistent {
            id: record.id.to_string(),
            message: format!("ancestor {} has no metadata", name),
        })?;
        parent_ids.push(parent.id.to_string());
        next = parent.parent;
    }

    Ok(Snapshot {
        id: record.id.to_string(),
        kind: record.kind,
        parent_ids,
    })
}

fn scan<T>(table: &T) -> Result<Vec<(String, SnapshotRecord)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    for item in table
        .iter()
        .map_err(|e| StrataError::transaction("iterate", e))?
    {
        let (key, value) = item.map_err(|e| StrataError::transaction("iterate", e))?;
        let record: SnapshotRecord = serde_json::from_slice(value.value())?;
        records.push((key.value().to_string(), record));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, MetaStore) {
        let tmp = TempDir::new().unwrap();
        let store = MetaStore::open(tmp.path().join("metadata.db")).unwrap();
        (tmp, store)
    }

    fn commit_layer(store: &MetaStore, key: &str, name: &str, parent: Option<&str>) -> String {
        let txn = store.begin_write().unwrap();
        txn.create_snapshot(Kind::Active, key, parent, &SnapshotOpts::new())
            .unwrap();
        let id = txn
            .commit_active(key, name, Usage::default(), &SnapshotOpts::new())
            .unwrap();
        txn.commit().unwrap();
        id
    }

    #[test]
    fn test_ids_are_sequential() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        let a = txn
            .create_snapshot(Kind::Active, "a", None, &SnapshotOpts::new())
            .unwrap();
        let b = txn
            .create_snapshot(Kind::Active, "b", None, &SnapshotOpts::new())
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(a.id, "1");
        assert_eq!(b.id, "2");
        assert!(a.parent_ids.is_empty());
    }

    #[test]
    fn test_rolled_back_id_is_reissued() {
        let (_tmp, store) = temp_store();

        let txn = store.begin_write().unwrap();
        let first = txn
            .create_snapshot(Kind::Active, "a", None, &SnapshotOpts::new())
            .unwrap();
        txn.rollback().unwrap();

        let txn = store.begin_write().unwrap();
        let second = txn
            .create_snapshot(Kind::Active, "a", None, &SnapshotOpts::new())
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_create_duplicate_key() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        txn.create_snapshot(Kind::Active, "a", None, &SnapshotOpts::new())
            .unwrap();
        let err = txn
            .create_snapshot(Kind::View, "a", None, &SnapshotOpts::new())
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_create_empty_key() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        let err = txn
            .create_snapshot(Kind::Active, "", None, &SnapshotOpts::new())
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument(_)));
    }

    #[test]
    fn test_create_with_missing_parent() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        let err = txn
            .create_snapshot(Kind::Active, "a", Some("nope"), &SnapshotOpts::new())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_create_with_active_parent() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        txn.create_snapshot(Kind::Active, "base", None, &SnapshotOpts::new())
            .unwrap();
        let err = txn
            .create_snapshot(Kind::Active, "child", Some("base"), &SnapshotOpts::new())
            .unwrap_err();
        assert!(matches!(err, StrataError::FailedPrecondition(_)));
    }

    #[test]
    fn test_parent_ids_nearest_first() {
        let (_tmp, store) = temp_store();
        let l1 = commit_layer(&store, "a", "layer1", None);
        let l2 = commit_layer(&store, "b", "layer2", Some("layer1"));

        let txn = store.begin_write().unwrap();
        let snap = txn
            .create_snapshot(Kind::View, "v", Some("layer2"), &SnapshotOpts::new())
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(snap.parent_ids, vec![l2.clone(), l1.clone()]);

        let read = store.begin_read().unwrap();
        assert_eq!(read.get_snapshot("v").unwrap().parent_ids, vec![l2, l1]);
    }

    #[test]
    fn test_commit_active_preserves_id_and_merges_labels() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        let snap = txn
            .create_snapshot(
                Kind::Active,
                "work",
                None,
                &SnapshotOpts::new().with_label("stage", "build"),
            )
            .unwrap();
        let usage = Usage {
            size: 42,
            inodes: 3,
        };
        let id = txn
            .commit_active(
                "work",
                "layer",
                usage,
                &SnapshotOpts::new().with_label("release", "1"),
            )
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(id, snap.id);
        let read = store.begin_read().unwrap();
        assert!(read.get_record("work").unwrap().is_none());
        let (rid, info, recorded) = read.get_info("layer").unwrap();
        assert_eq!(rid, snap.id);
        assert_eq!(info.kind, Kind::Committed);
        assert_eq!(recorded, usage);
        assert_eq!(info.labels.len(), 2);
    }

    #[test]
    fn test_commit_view_is_rejected() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        txn.create_snapshot(Kind::View, "v", None, &SnapshotOpts::new())
            .unwrap();
        let err = txn
            .commit_active("v", "layer", Usage::default(), &SnapshotOpts::new())
            .unwrap_err();
        assert!(matches!(err, StrataError::FailedPrecondition(_)));
    }

    #[test]
    fn test_commit_name_taken() {
        let (_tmp, store) = temp_store();
        commit_layer(&store, "a", "layer", None);
        let txn = store.begin_write().unwrap();
        txn.create_snapshot(Kind::Active, "b", None, &SnapshotOpts::new())
            .unwrap();
        let err = txn
            .commit_active("b", "layer", Usage::default(), &SnapshotOpts::new())
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_remove_parent_with_children_fails() {
        let (_tmp, store) = temp_store();
        commit_layer(&store, "a", "layer1", None);
        let txn = store.begin_write().unwrap();
        txn.create_snapshot(Kind::Active, "child", Some("layer1"), &SnapshotOpts::new())
            .unwrap();
        txn.commit().unwrap();

        let txn = store.begin_write().unwrap();
        let err = txn.remove("layer1").unwrap_err();
        assert!(matches!(err, StrataError::FailedPrecondition(_)));
        txn.rollback().unwrap();

        // Once the child is gone the parent becomes removable
        let txn = store.begin_write().unwrap();
        txn.remove("child").unwrap();
        let (_, owns_dir) = txn.remove("layer1").unwrap();
        assert!(owns_dir);
        txn.commit().unwrap();
    }

    #[test]
    fn test_remove_view_over_parent_owns_no_directory() {
        let (_tmp, store) = temp_store();
        commit_layer(&store, "a", "layer1", None);
        let txn = store.begin_write().unwrap();
        txn.create_snapshot(Kind::View, "v", Some("layer1"), &SnapshotOpts::new())
            .unwrap();
        let (_, owns_dir) = txn.remove("v").unwrap();
        assert!(!owns_dir);
    }

    #[test]
    fn test_remove_missing() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        assert!(txn.remove("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_info_label_paths() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        txn.create_snapshot(
            Kind::Active,
            "a",
            None,
            &SnapshotOpts::new().with_label("keep", "1").with_label("drop", "2"),
        )
        .unwrap();
        txn.commit().unwrap();

        let read = store.begin_read().unwrap();
        let (_, mut info, _) = read.get_info("a").unwrap();
        drop(read);
        let before = info.updated;

        info.labels.remove("drop");
        info.labels.insert("new".to_string(), "3".to_string());
        let txn = store.begin_write().unwrap();
        let updated = txn
            .update_info(&info, &["labels.drop".to_string(), "labels.new".to_string()])
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(updated.labels.get("keep").map(String::as_str), Some("1"));
        assert_eq!(updated.labels.get("new").map(String::as_str), Some("3"));
        assert!(!updated.labels.contains_key("drop"));
        assert!(updated.updated >= before);
    }

    #[test]
    fn test_update_info_rejects_immutable_field() {
        let (_tmp, store) = temp_store();
        let txn = store.begin_write().unwrap();
        txn.create_snapshot(Kind::Active, "a", None, &SnapshotOpts::new())
            .unwrap();
        let (_, info, _) = txn.get_info("a").unwrap();
        let err = txn.update_info(&info, &["parent".to_string()]).unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument(_)));
    }

    #[test]
    fn test_records_persist_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.db");
        {
            let store = MetaStore::open(&path).unwrap();
            commit_layer(&store, "a", "layer1", None);
        }
        let store = MetaStore::open(&path).unwrap();
        let records = store.begin_read().unwrap().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "layer1");
        assert_eq!(records[0].1.kind, Kind::Committed);
    }

    #[test]
    fn test_closed_store_rejects_transactions() {
        let (_tmp, store) = temp_store();
        assert!(store.close());
        assert!(!store.close());
        assert!(store.is_closed());
        assert!(matches!(store.begin_read(), Err(StrataError::Closed)));
        assert!(matches!(store.begin_write(), Err(StrataError::Closed)));
    }
}
