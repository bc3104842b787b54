//! Strata Runtime - layered snapshot storage for build workers.
//!
//! Provides the snapshot manager and its redb metadata store, union mount
//! providers for the snapshot root, the local content store, and the worker
//! that ties them to a build-step executor.

#![allow(clippy::result_large_err)]

pub mod content;
pub mod fs;
pub mod metrics;
pub mod mount;
pub mod snapshot;
pub mod worker;

// Re-export common types
pub use content::{BlobInfo, ContentStore};
pub use metrics::{MetricsCollector, SnapshotMetrics};
pub use mount::{
    FuseUnionProvider, MountInfo, NativeProvider, ProviderRegistry, UnionMount,
    UnionMountProvider,
};
pub use snapshot::{CheckReport, CleanupReport, MetaStore, MissingDirectory, Snapshotter};
pub use worker::{BuildStep, Executor, GcReport, Worker, WorkerOpt};

/// Strata Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
