//! Strata Core - shared snapshot types, errors, and configuration.
//!
//! Everything here is storage-agnostic; the snapshot manager, metadata
//! store, and union mount providers live in `strata-runtime`.

pub mod config;
pub mod error;
pub mod log;
pub mod snapshot;

// Re-export commonly used types
pub use config::{StrataConfig, UnionConfig};
pub use error::{Result, StrataError};
pub use log::{LogConfig, LogFormat, LogLevel};
pub use snapshot::{Info, Kind, MountSpec, Snapshot, SnapshotOpts, Usage};

/// Strata version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
