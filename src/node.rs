use crate::blockchain::{Block, Chain};
use crate::error::{ChainError, ValidationError};
use crate::tx::Transaction;
use std::collections::VecDeque;

/// Transactions taken from the mempool per proposed block.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// A staking validator with its own mempool and chain replica.
///
/// Nothing here is shared: two nodes converge only by applying the same
/// blocks to their own replicas.
#[derive(Debug, Clone)]
pub struct ValidatorNode {
    address: String,
    stake: u64,
    /// Pending transactions in arrival order.
    mempool: VecDeque<Transaction>,
    chain: Chain,
    batch_size: usize,
}

impl ValidatorNode {
    /// `genesis` is copied into the node's replica.
    pub fn new(address: impl Into<String>, stake: u64, genesis: Block) -> Self {
        Self {
            address: address.into(),
            stake,
            mempool: VecDeque::new(),
            chain: Chain::from_genesis(genesis),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn stake(&self) -> u64 {
        self.stake
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn mempool(&self) -> impl Iterator<Item = &Transaction> {
        self.mempool.iter()
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.len()
    }

    pub fn head_hash(&self) -> Result<&str, ChainError> {
        Ok(self.chain.latest()?.hash())
    }

    /// Queues a transaction. No duplicate or fee checks.
    pub fn receive_transaction(&mut self, tx: Transaction) {
        self.mempool.push_back(tx);
    }

    /// Seals the oldest `batch_size` pending transactions into a block on
    /// top of the local head, removing them from the mempool.
    ///
    /// Returns `None` when the mempool is empty. The block is not applied
    /// here; see [`ValidatorNode::commit_own_block`].
    pub fn propose_block(&mut self) -> Result<Option<Block>, ChainError> {
        if self.mempool.is_empty() {
            return Ok(None);
        }
        let head = self.chain.latest()?;
        let take = self.batch_size.min(self.mempool.len());
        let batch: Vec<Transaction> = self.mempool.drain(..take).collect();
        Ok(Some(Block::new(
            head.index() + 1,
            &batch,
            head.hash(),
            self.address.as_str(),
        )))
    }

    /// Appends a block this node proposed itself, without re-checking the
    /// hash it just computed.
    pub fn commit_own_block(&mut self, block: Block) -> Result<(), ChainError> {
        self.chain.try_append(block)
    }

    /// Checks a block received from another node and applies it.
    ///
    /// Integrity is checked before linkage. On failure the replica is left
    /// untouched.
    pub fn validate_and_apply(&mut self, block: &Block) -> Result<(), ValidationError> {
        block
            .verify_hash()
            .map_err(|computed| ValidationError::CorruptBlock {
                index: block.index(),
                stored: block.hash().to_string(),
                computed,
            })?;

        let head = self.chain.latest()?;
        if block.previous_hash() != head.hash() {
            // Stale view or fork. No reconciliation is attempted.
            return Err(ValidationError::LinkageMismatch {
                index: block.index(),
                expected: head.hash().to_string(),
                found: block.previous_hash().to_string(),
            });
        }

        self.chain.try_append(block.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(i: usize) -> Transaction {
        Transaction::with_timestamp(format!("sender_{}", i), format!("recipient_{}", i), 1.0 + i as f64, 10 + i as i64)
    }

    fn network(stakes: &[u64]) -> Vec<ValidatorNode> {
        let genesis = Block::genesis();
        stakes
            .iter()
            .enumerate()
            .map(|(i, &stake)| ValidatorNode::new(format!("node_{}", i), stake, genesis.clone()))
            .collect()
    }

    /// Simulates tampering in transit by editing the wire form.
    fn tamper(block: &Block, field: &str, value: serde_json::Value) -> Block {
        let mut raw = serde_json::to_value(block).unwrap();
        raw[field] = value;
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn propose_drains_oldest_batch_in_order() {
        let mut node = network(&[1]).remove(0);
        let pending: Vec<Transaction> = (1..=7).map(tx).collect();
        for t in &pending {
            node.receive_transaction(t.clone());
        }
        assert_eq!(node.mempool_len(), 7);

        let block = node.propose_block().unwrap().unwrap();
        assert_eq!(block.transactions(), &pending[..5]);
        let left: Vec<&Transaction> = node.mempool().collect();
        assert_eq!(left, vec![&pending[5], &pending[6]]);

        // Proposing does not touch the replica.
        assert_eq!(node.chain().len(), 1);
    }

    #[test]
    fn propose_with_fewer_than_batch_takes_all() {
        let mut node = network(&[1]).remove(0);
        node.receive_transaction(tx(1));
        node.receive_transaction(tx(2));
        let block = node.propose_block().unwrap().unwrap();
        assert_eq!(block.transactions().len(), 2);
        assert_eq!(node.mempool_len(), 0);
    }

    #[test]
    fn custom_batch_size() {
        let mut node = network(&[1]).remove(0).with_batch_size(2);
        for i in 0..3 {
            node.receive_transaction(tx(i));
        }
        let block = node.propose_block().unwrap().unwrap();
        assert_eq!(block.transactions().len(), 2);
        assert_eq!(node.mempool_len(), 1);
    }

    #[test]
    fn empty_mempool_proposes_nothing() {
        let mut node = network(&[1]).remove(0);
        let head = node.head_hash().unwrap().to_string();
        assert!(node.propose_block().unwrap().is_none());
        assert_eq!(node.chain().len(), 1);
        assert_eq!(node.head_hash().unwrap(), head);
    }

    #[test]
    fn corrupt_block_is_rejected() {
        let mut nodes = network(&[1, 1]);
        for i in 0..3 {
            nodes[0].receive_transaction(tx(i));
        }
        let block = nodes[0].propose_block().unwrap().unwrap();

        for (field, value) in [
            ("validator", serde_json::json!("mallory")),
            ("index", serde_json::json!(7)),
            ("timestamp", serde_json::json!(block.timestamp() + 1)),
            ("transactions", serde_json::json!([])),
            ("previous_hash", serde_json::json!("0")),
        ] {
            let forged = tamper(&block, field, value);
            match nodes[1].validate_and_apply(&forged) {
                Err(ValidationError::CorruptBlock { stored, computed, .. }) => {
                    assert_eq!(stored, block.hash());
                    assert_ne!(computed, stored);
                }
                other => panic!("{} tamper not detected: {:?}", field, other),
            }
            assert_eq!(nodes[1].chain().len(), 1);
        }

        nodes[1].validate_and_apply(&block).unwrap();
        assert_eq!(nodes[1].chain().len(), 2);
    }

    #[test]
    fn desynced_node_rejects_while_synced_nodes_apply() {
        let mut nodes = network(&[1, 1, 1]);

        nodes[0].receive_transaction(tx(0));
        let first = nodes[0].propose_block().unwrap().unwrap();
        nodes[0].commit_own_block(first.clone()).unwrap();
        nodes[1].validate_and_apply(&first).unwrap();
        // node 2 never saw the first block.

        nodes[0].receive_transaction(tx(1));
        let second = nodes[0].propose_block().unwrap().unwrap();
        nodes[0].commit_own_block(second.clone()).unwrap();

        nodes[1].validate_and_apply(&second).unwrap();
        match nodes[2].validate_and_apply(&second) {
            Err(ValidationError::LinkageMismatch { index, expected, found }) => {
                assert_eq!(index, 2);
                assert_eq!(expected, nodes[2].head_hash().unwrap());
                assert_eq!(found, first.hash());
            }
            other => panic!("expected linkage mismatch, got {:?}", other),
        }
        assert_eq!(nodes[1].chain().len(), 3);
        assert_eq!(nodes[2].chain().len(), 1);
    }

    #[test]
    fn three_nodes_converge_on_one_block() {
        let mut nodes = network(&[1, 1, 1]);
        for i in 0..5 {
            nodes[0].receive_transaction(tx(i));
        }
        let genesis_hash = nodes[0].head_hash().unwrap().to_string();

        let block = nodes[0].propose_block().unwrap().unwrap();
        assert_eq!(block.index(), 1);
        assert_eq!(block.transactions().len(), 5);
        assert_eq!(block.previous_hash(), genesis_hash);
        assert_eq!(block.validator(), "node_0");

        nodes[0].commit_own_block(block.clone()).unwrap();
        for node in nodes.iter_mut().skip(1) {
            node.validate_and_apply(&block).unwrap();
        }

        for node in &nodes {
            assert_eq!(node.chain().len(), 2);
            assert_eq!(node.head_hash().unwrap(), block.hash());
        }
    }
}
