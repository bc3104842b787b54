//! `strata mounts` command.

use clap::Args;
use strata_core::config::StrataConfig;

use crate::output::print_mounts;

#[derive(Args)]
pub struct MountsArgs {
    /// Key of an active or view snapshot
    pub key: String,

    /// Print mounts as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(
    args: MountsArgs,
    config: &StrataConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let MountsArgs { key, json } = args;
    let mounts = super::with_worker(config, |worker| async move {
        let mounts = worker.snapshotter().mounts(&key).await?;
        Ok::<_, super::BoxError>(mounts)
    })
    .await?;

    print_mounts(&mounts, json)
}
