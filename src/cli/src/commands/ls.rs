//! `strata ls` command - list snapshots.

use clap::Args;
use strata_core::config::StrataConfig;
use strata_core::snapshot::{Info, Kind};

use crate::output;

#[derive(Args)]
pub struct LsArgs {
    /// Only show snapshots of this kind (active, view, committed)
    #[arg(long)]
    pub kind: Option<Kind>,

    /// Only display names
    #[arg(short, long)]
    pub quiet: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: LsArgs, config: &StrataConfig) -> Result<(), Box<dyn std::error::Error>> {
    let kind = args.kind;
    let mut infos = super::with_worker(config, |worker| async move {
        let mut infos: Vec<Info> = Vec::new();
        worker
            .snapshotter()
            .walk_all(|info| {
                if kind.map_or(true, |k| info.kind == k) {
                    infos.push(info.clone());
                }
                Ok(())
            })
            .await?;
        Ok::<_, super::BoxError>(infos)
    })
    .await?;
    infos.sort_by(|a, b| a.name.cmp(&b.name));

    if args.json {
        return output::print_json(&infos);
    }

    if args.quiet {
        for info in &infos {
            println!("{}", info.name);
        }
        return Ok(());
    }

    let mut table = output::new_table(&["NAME", "PARENT", "KIND", "CREATED", "LABELS"]);
    for info in &infos {
        table.add_row(&[
            info.name.clone(),
            info.parent.clone().unwrap_or_default(),
            info.kind.to_string(),
            output::format_ago(&info.created),
            output::format_labels(&info.labels),
        ]);
    }
    println!("{table}");
    Ok(())
}
