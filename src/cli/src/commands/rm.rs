//! `strata rm` command - remove one or more snapshots.

use clap::Args;
use strata_core::config::StrataConfig;

#[derive(Args)]
pub struct RmArgs {
    /// Snapshot keys or names to remove
    #[arg(required = true)]
    pub keys: Vec<String>,

    /// Ignore snapshots that do not exist
    #[arg(short, long)]
    pub force: bool,
}

pub async fn execute(args: RmArgs, config: &StrataConfig) -> Result<(), Box<dyn std::error::Error>> {
    let errors = super::with_worker(config, |worker| async move {
        let mut errors: Vec<String> = Vec::new();

        for key in &args.keys {
            match worker.snapshotter().remove(key).await {
                Ok(()) => println!("{key}"),
                Err(e) if args.force && e.is_not_found() => continue,
                Err(e) => errors.push(format!("{key}: {e}")),
            }
        }
        Ok::<_, super::BoxError>(errors)
    })
    .await?;

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = errors.join("\n");
        Err(format!("Failed to remove snapshot(s):\n{msg}").into())
    }
}
