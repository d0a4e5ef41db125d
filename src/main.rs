use anyhow::Result;
use clap::Parser;
use poschain::generator::{generate_transactions, generate_validators};
use poschain::{ChainStore, Coordinator, SimulationConfig, TracingSink};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Proof-of-Stake network simulator.
///
/// Runs a number of stake-weighted rounds over in-process validator nodes
/// and reports the resulting chain.
#[derive(Parser, Debug)]
#[clap(name = "poschain", version, about)]
struct Args {
    /// Config file (toml, json, yaml...). POSCHAIN_* env vars apply on top.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Number of validator nodes
    #[clap(short, long)]
    nodes: Option<usize>,

    /// Number of rounds to run
    #[clap(short, long)]
    rounds: Option<u64>,

    /// Random seed for a reproducible run
    #[clap(long)]
    seed: Option<u64>,

    /// Persist every replica to this sled database after the run
    #[clap(long)]
    db: Option<PathBuf>,

    /// Pause between rounds in milliseconds
    #[clap(long)]
    delay_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut SimulationConfig) {
        if let Some(nodes) = self.nodes {
            config.nodes = nodes;
        }
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.db.is_some() {
            config.db_path = self.db;
        }
        if let Some(delay) = self.delay_ms {
            config.round_delay_ms = delay;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = SimulationConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    tracing_subscriber::fmt()
        .with_max_level(config.level()?)
        .init();

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = StdRng::seed_from_u64(seed);
    tracing::info!(
        nodes = config.nodes,
        rounds = config.rounds,
        batch_size = config.batch_size,
        fanout = config.fanout,
        seed,
        "starting proof-of-stake simulation"
    );

    let nodes = generate_validators(
        config.nodes,
        config.min_stake..=config.max_stake,
        config.batch_size,
        &mut rng,
    );
    for (i, node) in nodes.iter().enumerate() {
        tracing::info!(node = i, address = node.address(), stake = node.stake(), "created node");
    }
    let addresses: Vec<String> = nodes.iter().map(|n| n.address().to_string()).collect();

    // Workload and selection draw from separate streams so the same seed
    // reproduces both.
    let workload_seed: u64 = rng.gen();
    let mut workload = StdRng::seed_from_u64(workload_seed);
    let mut coordinator = Coordinator::new(nodes, rng, Arc::new(TracingSink), config.fanout)?;

    for _ in 0..config.rounds {
        let transactions = generate_transactions(
            &addresses,
            config.min_txs_per_round..=config.max_txs_per_round,
            config.min_amount..=config.max_amount,
            &mut workload,
        );
        let outcome = coordinator.run_round(transactions).await?;
        match &outcome.block {
            Some(block) => tracing::info!(
                round = outcome.round,
                %block,
                accepted = outcome.accepted(),
                rejected = outcome.results.len() - outcome.accepted(),
                "round finished"
            ),
            None => tracing::info!(round = outcome.round, proposer = %outcome.proposer_address, "round finished without a block"),
        }
        if config.round_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.round_delay_ms)).await;
        }
    }

    let nodes = coordinator.shutdown().await?;
    tracing::info!("simulation finished");

    if let Some(reference) = nodes.first() {
        for block in reference.chain().blocks() {
            tracing::info!(%block, "final chain");
        }
    }
    for (i, node) in nodes.iter().enumerate() {
        tracing::info!(
            node = i,
            address = node.address(),
            stake = node.stake(),
            height = node.chain().height(),
            head = node.head_hash()?,
            "final node state"
        );
    }

    if let Some(path) = &config.db_path {
        let store = ChainStore::open(path)?;
        for node in &nodes {
            store.save_chain(node.address(), node.chain())?;
        }
        tracing::info!(path = %path.display(), replicas = nodes.len(), "persisted chains");
    }

    Ok(())
}
