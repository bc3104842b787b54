//! `strata label` command - set or clear labels on a snapshot.

use clap::Args;
use strata_core::config::StrataConfig;

use crate::output::format_labels;

#[derive(Args)]
pub struct LabelArgs {
    /// Snapshot key or name
    pub key: String,

    /// KEY=VALUE to set, KEY= to clear
    #[arg(required = true)]
    pub labels: Vec<String>,
}

pub async fn execute(
    args: LabelArgs,
    config: &StrataConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let changes = super::parse_labels(&args.labels)?;
    let key = args.key;

    let info = super::with_worker(config, |worker| async move {
        let sn = worker.snapshotter();
        let mut info = sn.stat(&key).await?;

        let mut fieldpaths = Vec::with_capacity(changes.len());
        for (label, value) in changes {
            fieldpaths.push(format!("labels.{label}"));
            if value.is_empty() {
                info.labels.remove(&label);
            } else {
                info.labels.insert(label, value);
            }
        }

        let info = sn.update(info, &fieldpaths).await?;
        Ok::<_, super::BoxError>(info)
    })
    .await?;

    println!("{}\t{}", info.name, format_labels(&info.labels));
    Ok(())
}
