//! `strata prune` command - reclaim space from orphans and unreferenced blobs.

use clap::Args;
use strata_core::config::StrataConfig;

use crate::output;

#[derive(Args)]
pub struct PruneArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(
    args: PruneArgs,
    config: &StrataConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = super::with_worker(config, |worker| async move {
        let report = worker.garbage_collect().await?;
        Ok::<_, super::BoxError>(report)
    })
    .await?;

    if args.json {
        return output::print_json(&report);
    }

    for path in &report.snapshots.restored {
        println!("Restored: {}", path.display());
    }
    for path in &report.snapshots.removed {
        println!("Removed: {}", path.display());
    }
    for blob in &report.blobs_removed {
        println!("Deleted: {}", blob.digest);
    }
    println!(
        "Total reclaimed space: {}",
        output::format_bytes(report.bytes_reclaimed)
    );
    Ok(())
}
