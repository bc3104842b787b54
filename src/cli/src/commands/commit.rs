//! `strata commit` command - finalize an active snapshot.

use clap::Args;
use strata_core::config::StrataConfig;

#[derive(Args)]
pub struct CommitArgs {
    /// Name of the committed snapshot
    pub name: String,

    /// Key of the active snapshot to commit
    pub key: String,

    /// Label to attach (KEY=VALUE, repeatable)
    #[arg(short, long = "label")]
    pub labels: Vec<String>,
}

pub async fn execute(
    args: CommitArgs,
    config: &StrataConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let opts = super::snapshot_opts(&args.labels)?;
    let name = args.name.clone();
    super::with_worker(config, |worker| async move {
        worker.snapshotter().commit(&args.name, &args.key, opts).await?;
        Ok::<_, super::BoxError>(())
    })
    .await?;

    println!("{name}");
    Ok(())
}
