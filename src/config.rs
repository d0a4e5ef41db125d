//! Run parameters.
//!
//! Sources, lowest precedence first: built-in defaults, an optional config
//! file, `POSCHAIN_*` environment variables. The CLI applies its own
//! overrides on top.

use crate::error::{Error, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "POSCHAIN";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Number of validator nodes.
    pub nodes: usize,
    /// Rounds to run.
    pub rounds: u64,
    /// Transactions per proposed block.
    pub batch_size: usize,
    /// Nodes each generated transaction is delivered to.
    pub fanout: usize,
    pub min_stake: u64,
    pub max_stake: u64,
    pub min_txs_per_round: usize,
    pub max_txs_per_round: usize,
    pub min_amount: f64,
    pub max_amount: f64,
    /// Rng seed; a random one is drawn when absent.
    pub seed: Option<u64>,
    /// Pause between rounds, for watching a run live.
    pub round_delay_ms: u64,
    /// Where to persist chain replicas after the run.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            rounds: 5,
            batch_size: crate::node::DEFAULT_BATCH_SIZE,
            fanout: crate::consensus::DEFAULT_FANOUT,
            min_stake: 10,
            max_stake: 1000,
            min_txs_per_round: 3,
            max_txs_per_round: 8,
            min_amount: 0.1,
            max_amount: 10.0,
            seed: None,
            round_delay_ms: 0,
            db_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Loads defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("nodes", defaults.nodes as u64)?
            .set_default("rounds", defaults.rounds)?
            .set_default("batch_size", defaults.batch_size as u64)?
            .set_default("fanout", defaults.fanout as u64)?
            .set_default("min_stake", defaults.min_stake)?
            .set_default("max_stake", defaults.max_stake)?
            .set_default("min_txs_per_round", defaults.min_txs_per_round as u64)?
            .set_default("max_txs_per_round", defaults.max_txs_per_round as u64)?
            .set_default("min_amount", defaults.min_amount)?
            .set_default("max_amount", defaults.max_amount)?
            .set_default("round_delay_ms", defaults.round_delay_ms)?
            .set_default("log_level", defaults.log_level)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.nodes == 0 {
            return invalid("nodes must be at least 1");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1");
        }
        if self.fanout == 0 {
            return invalid("fanout must be at least 1");
        }
        if self.max_stake == 0 {
            return invalid("max_stake must be positive");
        }
        if self.min_stake > self.max_stake {
            return invalid("min_stake exceeds max_stake");
        }
        if self.min_txs_per_round > self.max_txs_per_round {
            return invalid("min_txs_per_round exceeds max_txs_per_round");
        }
        if !(self.min_amount.is_finite() && self.max_amount.is_finite())
            || self.min_amount < 0.0
            || self.min_amount > self.max_amount
        {
            return invalid("amount range must be finite, non-negative and ordered");
        }
        self.level()?;
        Ok(())
    }

    pub fn level(&self) -> Result<tracing::Level> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| Error::InvalidConfig(format!("unknown log level {}", self.log_level)))
    }
}
