//! `strata check` command - report drift between metadata and disk.

use clap::Args;
use strata_core::config::StrataConfig;

use crate::output;

#[derive(Args)]
pub struct CheckArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(
    args: CheckArgs,
    config: &StrataConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = super::with_worker(config, |worker| async move {
        let report = worker.snapshotter().check().await?;
        Ok::<_, super::BoxError>(report)
    })
    .await?;

    if args.json {
        output::print_json(&report)?;
    } else {
        println!("Snapshots: {}", report.snapshots);
        for missing in &report.missing {
            println!("Missing directory: {} (id {})", missing.name, missing.id);
        }
        for parked in &report.quarantined {
            println!(
                "Interrupted remove: {} (id {}) is in quarantine",
                parked.name, parked.id
            );
        }
        for orphan in &report.orphans {
            println!("Orphan: {}", orphan.display());
        }
    }

    if report.is_clean() {
        if !args.json {
            println!("OK");
        }
        Ok(())
    } else {
        Err(format!(
            "{} snapshot(s) without a directory, {} in quarantine, {} orphan(s); run `strata prune` to restore quarantined snapshots and remove orphans",
            report.missing.len(),
            report.quarantined.len(),
            report.orphans.len()
        )
        .into())
    }
}
