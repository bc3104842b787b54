//! `strata view` command - create a read-only snapshot.

use clap::Args;
use strata_core::config::StrataConfig;

use crate::output::print_mounts;

#[derive(Args)]
pub struct ViewArgs {
    /// Key of the new view
    pub key: String,

    /// Committed snapshot to expose
    #[arg(long)]
    pub parent: Option<String>,

    /// Label to attach (KEY=VALUE, repeatable)
    #[arg(short, long = "label")]
    pub labels: Vec<String>,

    /// Print mounts as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ViewArgs, config: &StrataConfig) -> Result<(), Box<dyn std::error::Error>> {
    let opts = super::snapshot_opts(&args.labels)?;
    let json = args.json;
    let mounts = super::with_worker(config, |worker| async move {
        let mounts = worker
            .snapshotter()
            .view(&args.key, args.parent.as_deref(), opts)
            .await?;
        Ok::<_, super::BoxError>(mounts)
    })
    .await?;

    print_mounts(&mounts, json)
}
