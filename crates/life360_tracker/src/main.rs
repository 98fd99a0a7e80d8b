use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use life360_tracker::Config;
use life360_tracker::Coordinator;
use life360_tracker::Snapshot;
use life360_tracker::StateStore;
use life360_tracker::TrackedMembers;
use life360_tracker::TrackerEntry;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Replay Life360 snapshots through the device tracker platform and print the
/// resulting entity states.
#[derive(Debug, Parser)]
#[command(name = "life360-tracker", version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "life360.toml")]
    config: PathBuf,

    /// Account from the config file the snapshots belong to
    #[arg(short, long)]
    account: String,

    /// Snapshot JSON files, applied in order. A snapshot that fails to parse
    /// counts as a failed refresh.
    #[arg(required = true)]
    snapshots: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    info!("Loaded config from: {}", args.config.display());

    let account = config
        .accounts
        .get(&args.account)
        .with_context(|| format!("Account {} is not configured", args.account))?;

    let (first, rest) = args
        .snapshots
        .split_first()
        .context("At least one snapshot is required")?;
    let initial = Snapshot::from_json(&read(first)?)
        .with_context(|| format!("Invalid snapshot {}", first.display()))?;

    let coordinator = Arc::new(Coordinator::new(&args.account, account.options(), initial));
    let states = Arc::new(StateStore::new());
    let entry = TrackerEntry::from_config(
        &args.account,
        account,
        coordinator.clone(),
        TrackedMembers::new(),
        states.clone(),
    );
    info!(
        "Account {} set up with {} tracker(s)",
        entry.account(),
        entry.platform().len()
    );

    for path in rest {
        match Snapshot::from_json(&read(path)?) {
            Ok(snapshot) => {
                info!("Applying snapshot {}", path.display());
                coordinator.set_updated_data(snapshot);
            }
            Err(e) => {
                warn!("Snapshot {} rejected: {}", path.display(), e);
                coordinator.set_update_failed(&e.to_string());
            }
        }
    }

    let output = serde_json::to_string_pretty(&*states.snapshot())
        .context("Failed to serialize entity states")?;
    println!("{}", output);

    entry.unload();
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
