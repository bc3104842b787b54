//! Snapshot operation counters

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Point-in-time snapshot manager metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetrics {
    /// Time since the manager was opened (seconds)
    pub uptime_seconds: u64,

    /// Successful prepare calls
    pub prepared: u64,

    /// Successful view calls
    pub viewed: u64,

    /// Successful commits
    pub committed: u64,

    /// Successful removals
    pub removed: u64,

    /// Operations that returned an error
    pub failed: u64,

    /// Bytes copied from parents into new snapshots
    pub bytes_copied: u64,

    /// Orphaned directories deleted by cleanup
    pub orphans_removed: u64,
}

/// Which counter an operation bumps on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Prepare,
    View,
    Commit,
    Remove,
}

/// Thread-safe collector shared by every manager operation
#[derive(Clone)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<SnapshotMetrics>>,
    start_time: chrono::DateTime<chrono::Utc>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(SnapshotMetrics::default())),
            start_time: chrono::Utc::now(),
        }
    }

    /// Get current metrics
    pub fn snapshot(&self) -> SnapshotMetrics {
        let mut metrics = self.metrics.read().clone();
        metrics.uptime_seconds = (chrono::Utc::now() - self.start_time)
            .num_seconds()
            .max(0) as u64;
        metrics
    }

    /// Record the outcome of an operation
    pub fn record<T, E>(&self, op: Operation, result: &Result<T, E>) {
        let mut metrics = self.metrics.write();
        if result.is_err() {
            metrics.failed += 1;
            return;
        }
        match op {
            Operation::Prepare => metrics.prepared += 1,
            Operation::View => metrics.viewed += 1,
            Operation::Commit => metrics.committed += 1,
            Operation::Remove => metrics.removed += 1,
        }
    }

    pub fn add_bytes_copied(&self, bytes: u64) {
        self.metrics.write().bytes_copied += bytes;
    }

    pub fn add_orphans_removed(&self, count: u64) {
        self.metrics.write().orphans_removed += count;
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_success_and_failure() {
        let collector = MetricsCollector::new();
        collector.record::<(), ()>(Operation::Prepare, &Ok(()));
        collector.record::<(), ()>(Operation::Prepare, &Ok(()));
        collector.record::<(), ()>(Operation::Commit, &Ok(()));
        collector.record::<(), &str>(Operation::Remove, &Err("boom"));

        let metrics = collector.snapshot();
        assert_eq!(metrics.prepared, 2);
        assert_eq!(metrics.committed, 1);
        assert_eq!(metrics.removed, 0);
        assert_eq!(metrics.failed, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let collector = MetricsCollector::new();
        let other = collector.clone();
        other.add_bytes_copied(100);
        other.add_orphans_removed(2);

        let metrics = collector.snapshot();
        assert_eq!(metrics.bytes_copied, 100);
        assert_eq!(metrics.orphans_removed, 2);
    }

    #[test]
    fn test_metrics_serialize() {
        let json = serde_json::to_value(MetricsCollector::new().snapshot()).unwrap();
        assert_eq!(json["prepared"], 0);
        assert!(json.get("bytes_copied").is_some());
    }
}
