//! `strata usage` command - disk usage per snapshot.

use clap::Args;
use serde::Serialize;
use strata_core::config::StrataConfig;
use strata_core::snapshot::{Kind, Usage};

use crate::output;

#[derive(Args)]
pub struct UsageArgs {
    /// Snapshot keys or names (default: all snapshots)
    pub keys: Vec<String>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct UsageRow {
    name: String,
    kind: Kind,
    #[serde(flatten)]
    usage: Usage,
}

pub async fn execute(
    args: UsageArgs,
    config: &StrataConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let keys = args.keys;
    let rows = super::with_worker(config, |worker| async move {
        let sn = worker.snapshotter();

        let mut targets: Vec<(String, Kind)> = Vec::new();
        if keys.is_empty() {
            sn.walk_all(|info| {
                targets.push((info.name.clone(), info.kind));
                Ok(())
            })
            .await?;
            targets.sort_by(|a, b| a.0.cmp(&b.0));
        } else {
            for key in keys {
                let info = sn.stat(&key).await?;
                targets.push((info.name, info.kind));
            }
        }

        let mut rows = Vec::with_capacity(targets.len());
        for (name, kind) in targets {
            let usage = sn.usage(&name).await?;
            rows.push(UsageRow { name, kind, usage });
        }
        Ok::<_, super::BoxError>(rows)
    })
    .await?;

    if args.json {
        return output::print_json(&rows);
    }

    let mut total = Usage::default();
    let mut table = output::new_table(&["NAME", "KIND", "SIZE", "INODES"]);
    for row in &rows {
        total.add(row.usage);
        table.add_row(&[
            row.name.clone(),
            row.kind.to_string(),
            output::format_bytes(row.usage.size),
            row.usage.inodes.to_string(),
        ]);
    }
    println!("{table}");
    println!(
        "Total: {} in {} inodes",
        output::format_bytes(total.size),
        total.inodes
    );
    Ok(())
}
