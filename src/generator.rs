//! Random validator sets and transaction workloads for driving a run.

use crate::blockchain::Block;
use crate::node::ValidatorNode;
use crate::tx::Transaction;
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::ops::RangeInclusive;

/// `validator_node_{i}_` followed by a random sha256 digest.
pub fn random_address<R: Rng + ?Sized>(i: usize, rng: &mut R) -> String {
    let seed: u64 = rng.gen();
    let digest = Sha256::digest(seed.to_le_bytes());
    format!("validator_node_{}_{}", i, hex::encode(digest))
}

/// Builds `count` validators with random stakes, all seeded from one
/// genesis block.
pub fn generate_validators<R: Rng + ?Sized>(
    count: usize,
    stakes: RangeInclusive<u64>,
    batch_size: usize,
    rng: &mut R,
) -> Vec<ValidatorNode> {
    let genesis = Block::genesis();
    (0..count)
        .map(|i| {
            let address = random_address(i, rng);
            let stake = rng.gen_range(stakes.clone());
            tracing::debug!(node = i, %address, stake, "created validator");
            ValidatorNode::new(address, stake, genesis.clone()).with_batch_size(batch_size)
        })
        .collect()
}

/// Draws a random number of transfers between `addresses`.
///
/// Self-transfers are dropped, so fewer than the drawn count may be
/// returned.
pub fn generate_transactions<R: Rng + ?Sized>(
    addresses: &[String],
    count: RangeInclusive<usize>,
    amounts: RangeInclusive<f64>,
    rng: &mut R,
) -> Vec<Transaction> {
    let draws = rng.gen_range(count);
    let mut transactions = Vec::with_capacity(draws);
    for _ in 0..draws {
        let (Some(sender), Some(recipient)) = (addresses.choose(rng), addresses.choose(rng)) else {
            break;
        };
        if sender == recipient {
            continue;
        }
        let amount = rng.gen_range(amounts.clone());
        transactions.push(Transaction::new(sender.as_str(), recipient.as_str(), amount));
    }
    transactions
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn validators_share_genesis_and_respect_stake_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let nodes = generate_validators(6, 10..=1000, 4, &mut rng);
        assert_eq!(nodes.len(), 6);
        let genesis = nodes[0].head_hash().unwrap().to_string();
        for (i, node) in nodes.iter().enumerate() {
            assert!(node.address().starts_with(&format!("validator_node_{}_", i)));
            assert!((10..=1000).contains(&node.stake()));
            assert_eq!(node.batch_size(), 4);
            assert_eq!(node.head_hash().unwrap(), genesis);
        }
    }

    #[test]
    fn transactions_skip_self_transfers() {
        let mut rng = StdRng::seed_from_u64(5);
        let addresses: Vec<String> = (0..3).map(|i| format!("addr_{}", i)).collect();
        for _ in 0..50 {
            let txs = generate_transactions(&addresses, 3..=8, 0.1..=10.0, &mut rng);
            assert!(txs.len() <= 8);
            for tx in txs {
                assert_ne!(tx.sender(), tx.recipient());
                assert!((0.1..=10.0).contains(&tx.amount()));
                assert_eq!(tx.signature(), format!("signed_by_{}", tx.sender()));
            }
        }
    }

    #[test]
    fn no_addresses_no_transactions() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(generate_transactions(&[], 3..=8, 0.1..=10.0, &mut rng).is_empty());
    }
}
