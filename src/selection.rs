//! Stake-weighted proposer selection.
//!
//! A draw picks node `i` with probability `stake_i / total_stake`. Stakes
//! are laid out as a cumulative table and a uniform draw in `0..total` is
//! located with a binary search, so the outcome depends only on the rng
//! handle passed in.

use crate::error::{Error, Result};
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeSampler {
    /// `cumulative[i]` is the sum of stakes `0..=i`.
    cumulative: Vec<u64>,
    total: u64,
}

impl StakeSampler {
    /// Builds the table. Fails when there are no nodes or the stakes sum to
    /// zero, which is a startup error rather than a round failure.
    pub fn new(stakes: &[u64]) -> Result<Self> {
        if stakes.is_empty() {
            return Err(Error::NoValidators);
        }
        let mut cumulative = Vec::with_capacity(stakes.len());
        let mut total: u64 = 0;
        for &stake in stakes {
            total = total.checked_add(stake).ok_or(Error::StakeOverflow)?;
            cumulative.push(total);
        }
        if total == 0 {
            return Err(Error::ZeroTotalStake);
        }
        Ok(Self { cumulative, total })
    }

    pub fn total_stake(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    /// Selection probability of every node, in node order.
    pub fn weights(&self) -> Vec<f64> {
        let mut previous = 0;
        self.cumulative
            .iter()
            .map(|&c| {
                let stake = c - previous;
                previous = c;
                stake as f64 / self.total as f64
            })
            .collect()
    }

    /// Single weighted draw with replacement; returns a node index.
    /// Zero-stake nodes own an empty interval and are never returned.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let draw = rng.gen_range(0..self.total);
        self.cumulative.partition_point(|&c| c <= draw)
    }
}

/// One-shot selection over a stake list.
pub fn select_validator<R: Rng + ?Sized>(stakes: &[u64], rng: &mut R) -> Result<usize> {
    Ok(StakeSampler::new(stakes)?.sample(rng))
}
