//! `strata stat` command - snapshot metadata as JSON.

use clap::Args;
use strata_core::config::StrataConfig;

use crate::output::print_json;

#[derive(Args)]
pub struct StatArgs {
    /// Snapshot keys or names
    #[arg(required = true)]
    pub keys: Vec<String>,
}

pub async fn execute(args: StatArgs, config: &StrataConfig) -> Result<(), Box<dyn std::error::Error>> {
    let infos = super::with_worker(config, |worker| async move {
        let mut infos = Vec::with_capacity(args.keys.len());
        for key in &args.keys {
            infos.push(worker.snapshotter().stat(key).await?);
        }
        Ok::<_, super::BoxError>(infos)
    })
    .await?;

    if let [info] = infos.as_slice() {
        print_json(info)
    } else {
        print_json(&infos)
    }
}
