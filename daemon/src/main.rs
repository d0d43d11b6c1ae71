//! Forge daemon: rebuilds wallet state by replaying blocks from genesis.

use anyhow::Context;
use clap::Parser;
use forge_consensus::{DelegateRoster, VoteBalanceTracker};
use forge_node::{init_logging, BlockIngestor, NodeConfig};
use forge_state::{HandlerRegistry, StateSnapshot, WalletManager};
use forge_transactions::Block;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "forge-daemon", about = "Forge wallet-state daemon")]
struct Cli {
    /// Log format: "human" or "json".
    #[arg(long, env = "FORGE_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "FORGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Drop wallets that hold no state after every block.
    #[arg(long, env = "FORGE_PURGE_EMPTY_WALLETS")]
    purge_empty_wallets: bool,

    /// Recompute delegate vote balances after every block.
    #[arg(long, env = "FORGE_VERIFY_VOTE_BALANCES")]
    verify_vote_balances: bool,

    /// Height at which the first block's generator may be created.
    #[arg(long, env = "FORGE_GENESIS_HEIGHT")]
    genesis_height: Option<u64>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "FORGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Apply a JSON array of blocks in order and print the resulting state.
    Replay {
        blocks: PathBuf,

        /// Start from this snapshot instead of an empty state.
        #[arg(long)]
        from_snapshot: Option<PathBuf>,

        /// Write a snapshot of the final state here.
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },
    /// Verify a snapshot file and print what it holds.
    Inspect { snapshot: PathBuf },
}

impl Cli {
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(height) = self.genesis_height {
            config.genesis_height = height;
        }
        config.purge_empty_wallets |= self.purge_empty_wallets;
        config.verify_vote_balances |= self.verify_vote_balances;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Replay {
            blocks,
            from_snapshot,
            snapshot_out,
        } => {
            let config = cli.node_config()?;
            init_logging(config.log_format()?, &config.log_level);
            replay(config, blocks, from_snapshot.as_deref(), snapshot_out.as_deref())
        }
        Command::Inspect { snapshot } => {
            forge_utils::init_tracing();
            inspect(snapshot)
        }
    }
}

fn read_snapshot(path: &Path) -> anyhow::Result<StateSnapshot> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(StateSnapshot::from_bytes(&bytes)?)
}

fn replay(
    config: NodeConfig,
    blocks: &Path,
    from_snapshot: Option<&Path>,
    snapshot_out: Option<&Path>,
) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(blocks)
        .with_context(|| format!("reading blocks from {}", blocks.display()))?;
    let blocks: Vec<Block> = serde_json::from_str(&json).context("parsing blocks")?;

    let wallets = WalletManager::new(
        Arc::new(HandlerRegistry::with_core_handlers()),
        Arc::new(VoteBalanceTracker::new()),
    );
    let ingestor = BlockIngestor::new(wallets, config);
    if let Some(path) = from_snapshot {
        ingestor.restore(read_snapshot(path)?)?;
        tracing::info!(height = ingestor.height(), "resuming from snapshot");
    }

    let started = Instant::now();
    for block in blocks.iter().filter(|b| b.height() > ingestor.height()) {
        ingestor
            .apply(block)
            .with_context(|| format!("applying block {} at height {}", block.id(), block.height()))?;
    }

    let stats = ingestor.stats().snapshot();
    println!(
        "replayed to height {} in {}",
        ingestor.height(),
        forge_utils::format_duration(started.elapsed().as_secs())
    );
    for (name, value) in &stats {
        println!("  {name}: {value}");
    }

    {
        let wallets = ingestor.read()?;
        println!("wallets: {}", wallets.len());
        let roster = DelegateRoster::new(&wallets);
        for delegate in roster.registered() {
            println!(
                "  {:<20} {:>24} produced={} {}",
                delegate.username,
                delegate.vote_balance,
                delegate.produced_blocks,
                if delegate.resigned { "resigned" } else { "" }
            );
        }
    }

    if let Some(path) = snapshot_out {
        let snapshot = ingestor.snapshot()?;
        std::fs::write(path, snapshot.to_bytes()?)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        tracing::info!(path = %path.display(), height = snapshot.height, "wrote snapshot");
    }
    Ok(())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let snapshot = read_snapshot(path)?;
    let valid = snapshot.verify()?;
    println!("height: {}", snapshot.height);
    println!("version: {}", snapshot.version);
    println!("wallets: {}", snapshot.wallet_count());
    println!("hash ok: {valid}");
    if !valid {
        anyhow::bail!("snapshot {} failed its integrity check", path.display());
    }
    Ok(())
}
