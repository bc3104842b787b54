//! `strata info` command.

use clap::Args;
use strata_core::config::StrataConfig;
use strata_core::snapshot::Kind;

use crate::output::{format_bytes, format_labels};

#[derive(Args)]
pub struct InfoArgs;

pub async fn execute(_args: InfoArgs, config: &StrataConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("strata version {}", strata_core::VERSION);
    println!("Root: {}", config.root.display());
    println!("Snapshotter: {}", config.snapshotter);

    super::with_worker(config, |worker| async move {
        let sn = worker.snapshotter();
        println!("Worker ID: {}", worker.id());
        println!("Worker labels: {}", format_labels(worker.labels()));
        println!("Snapshot root: {}", sn.root().display());
        println!("Backing device: {}", sn.device());

        let (mut active, mut views, mut committed) = (0usize, 0usize, 0usize);
        sn.walk_all(|info| {
            match info.kind {
                Kind::Active => active += 1,
                Kind::View => views += 1,
                Kind::Committed => committed += 1,
            }
            Ok(())
        })
        .await?;
        println!("Snapshots: {committed} committed, {active} active, {views} views");

        let content = worker.content();
        let blobs = content.list()?;
        let size: u64 = blobs.iter().map(|b| b.size).sum();
        println!("Content: {} blobs ({})", blobs.len(), format_bytes(size));
        Ok::<_, super::BoxError>(())
    })
    .await
}
