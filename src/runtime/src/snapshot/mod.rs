//! Layered snapshot storage.

mod manager;
pub mod metastore;
pub mod staging;

pub use manager::{CheckReport, CleanupReport, MissingDirectory, Snapshotter};
pub use metastore::{MetaStore, ReadTxn, SnapshotRecord, WriteTxn};
pub use staging::{StagingArea, StagingDir};
