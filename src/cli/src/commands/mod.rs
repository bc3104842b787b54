//! CLI command definitions and dispatch.

mod check;
mod commit;
mod info;
mod label;
mod ls;
mod mounts;
mod prepare;
mod prune;
mod rm;
mod stat;
mod usage;
mod version;
mod view;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use strata_core::config::StrataConfig;
use strata_core::snapshot::SnapshotOpts;
use strata_runtime::{ProviderRegistry, Worker, WorkerOpt};

/// Strata - layered snapshot manager for image builds.
#[derive(Parser)]
#[command(name = "strata", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// State root (overrides the config file and STRATA_ROOT)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Config file (default: <root>/config.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Union mount provider backing the snapshot root
    #[arg(long, global = true)]
    pub snapshotter: Option<String>,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Create a writable snapshot, optionally on top of a committed parent
    Prepare(prepare::PrepareArgs),
    /// Create a read-only snapshot of a committed parent
    View(view::ViewArgs),
    /// Print the mounts of an active or view snapshot
    Mounts(mounts::MountsArgs),
    /// Commit an active snapshot under a new name
    Commit(commit::CommitArgs),
    /// Remove one or more snapshots
    Rm(rm::RmArgs),
    /// Display snapshot metadata as JSON
    Stat(stat::StatArgs),
    /// Show disk usage of snapshots
    Usage(usage::UsageArgs),
    /// List snapshots
    Ls(ls::LsArgs),
    /// Set or clear snapshot labels
    Label(label::LabelArgs),
    /// Compare metadata with the directories on disk
    Check(check::CheckArgs),
    /// Remove orphaned directories and unreferenced blobs
    Prune(prune::PruneArgs),
    /// Show version information
    Version(version::VersionArgs),
    /// Show system information
    Info(info::InfoArgs),
}

/// Error type returned by every command.
pub(crate) type BoxError = Box<dyn std::error::Error>;

/// Resolve configuration and apply command-line overrides.
pub fn load_config(global: &GlobalArgs) -> Result<StrataConfig, Box<dyn std::error::Error>> {
    let mut config = StrataConfig::resolve(global.config.as_deref())?;
    if let Some(root) = &global.root {
        config.root = root.clone();
    }
    if let Some(snapshotter) = &global.snapshotter {
        config.snapshotter = snapshotter.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Bring up the worker for the configured snapshotter.
pub(crate) fn open_worker(config: &StrataConfig) -> Result<Worker, Box<dyn std::error::Error>> {
    tracing::debug!(
        root = %config.root.display(),
        snapshotter = %config.snapshotter,
        "Opening worker"
    );
    let registry = ProviderRegistry::with_defaults(config);
    let opt = WorkerOpt::new(config, &registry, None)?;
    Ok(Worker::new(opt))
}

/// Run `f` against an open worker, closing the worker afterwards even when
/// the command fails.
pub(crate) async fn with_worker<T, F, Fut>(
    config: &StrataConfig,
    f: F,
) -> Result<T, Box<dyn std::error::Error>>
where
    F: FnOnce(Worker) -> Fut,
    Fut: Future<Output = Result<T, Box<dyn std::error::Error>>>,
{
    let worker = open_worker(config)?;
    let result = run_until_signal(f(worker.clone())).await.and_then(|r| r);
    let closed = worker.close().await;
    let value = result?;
    closed?;
    Ok(value)
}

/// Await `fut`, giving up on SIGINT or SIGTERM.
///
/// Snapshot operations already in flight finish on their blocking thread;
/// anything they leave behind is staging debris that `strata prune` removes.
pub(crate) async fn run_until_signal<F: Future>(
    fut: F,
) -> Result<F::Output, Box<dyn std::error::Error>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        out = fut => Ok(out),
        _ = tokio::signal::ctrl_c() => Err("interrupted".into()),
        _ = term.recv() => Err("terminated".into()),
    }
}

/// Parse `KEY=VALUE` pairs. An empty value is allowed.
pub(crate) fn parse_labels(
    raw: &[String],
) -> Result<HashMap<String, String>, Box<dyn std::error::Error>> {
    let mut labels = HashMap::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| format!("invalid label '{item}': expected KEY=VALUE"))?;
        if key.is_empty() {
            return Err(format!("invalid label '{item}': empty key").into());
        }
        labels.insert(key.to_string(), value.to_string());
    }
    Ok(labels)
}

/// Build snapshot options from `--label` flags.
pub(crate) fn snapshot_opts(raw: &[String]) -> Result<SnapshotOpts, Box<dyn std::error::Error>> {
    Ok(SnapshotOpts {
        labels: parse_labels(raw)?,
    })
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: StrataConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Prepare(args) => prepare::execute(args, &config).await,
        Command::View(args) => view::execute(args, &config).await,
        Command::Mounts(args) => mounts::execute(args, &config).await,
        Command::Commit(args) => commit::execute(args, &config).await,
        Command::Rm(args) => rm::execute(args, &config).await,
        Command::Stat(args) => stat::execute(args, &config).await,
        Command::Usage(args) => usage::execute(args, &config).await,
        Command::Ls(args) => ls::execute(args, &config).await,
        Command::Label(args) => label::execute(args, &config).await,
        Command::Check(args) => check::execute(args, &config).await,
        Command::Prune(args) => prune::execute(args, &config).await,
        Command::Version(args) => version::execute(args).await,
        Command::Info(args) => info::execute(args, &config).await,
    }
}
