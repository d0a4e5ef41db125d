//! Persists chain replicas to a sled database, one tree per node.
//!
//! Each tree holds the blocks as JSON under their hash, a `height/{index}`
//! key pointing at the hash of the block at that index, and a `latest`
//! pointer to the head. Saving a replica replaces whatever the tree held.
//!
//! Amounts must be finite: JSON has no encoding for NaN or infinity, so
//! such blocks are refused at save time rather than written as `null`.

use crate::blockchain::{Block, Chain};
use crate::error::{Error, Result};
use sled::Db;
use std::path::Path;

const LATEST_KEY: &[u8] = b"latest";
const DEFAULT_TREE: &[u8] = b"__sled__default";

fn height_key(index: u64) -> String {
    format!("height/{:020}", index)
}

fn read_block(tree: &sled::Tree, hash: &[u8]) -> Result<Option<Block>> {
    match tree.get(hash)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn check_encodable(block: &Block) -> Result<()> {
    match block.transactions().iter().find(|tx| !tx.amount().is_finite()) {
        Some(tx) => Err(Error::CorruptStore(format!(
            "block {} carries non-finite amount ({})",
            block.index(),
            tx
        ))),
        None => Ok(()),
    }
}

pub struct ChainStore {
    db: Db,
}

impl ChainStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(&path)?;
        tracing::info!(path = %path.as_ref().display(), "opened chain store");
        Ok(Self { db })
    }

    pub fn from_db(db: Db) -> Self {
        Self { db }
    }

    /// Addresses of every stored replica.
    pub fn addresses(&self) -> Result<Vec<String>> {
        let mut addresses = Vec::new();
        for name in self.db.tree_names() {
            if &*name == DEFAULT_TREE {
                continue;
            }
            if !self.db.open_tree(&name)?.contains_key(LATEST_KEY)? {
                continue;
            }
            let address = String::from_utf8(name.to_vec())
                .map_err(|error| Error::CorruptStore(error.to_string()))?;
            addresses.push(address);
        }
        Ok(addresses)
    }

    pub fn save_block(&self, address: &str, block: &Block) -> Result<()> {
        check_encodable(block)?;
        let tree = self.db.open_tree(address)?;
        let val = serde_json::to_vec(block)?;
        tree.insert(block.hash().as_bytes(), val)?;
        tree.insert(height_key(block.index()).as_bytes(), block.hash().as_bytes())?;
        tree.insert(LATEST_KEY, block.hash().as_bytes())?;
        Ok(())
    }

    /// Replaces the stored replica for `address` with `chain` and flushes.
    pub fn save_chain(&self, address: &str, chain: &Chain) -> Result<()> {
        for block in chain.blocks() {
            check_encodable(block)?;
        }
        self.db.open_tree(address)?.clear()?;
        for block in chain.blocks() {
            self.save_block(address, block)?;
        }
        self.db.flush()?;
        tracing::debug!(%address, blocks = chain.len(), "saved chain");
        Ok(())
    }

    pub fn get_latest(&self, address: &str) -> Result<Option<Block>> {
        let tree = self.db.open_tree(address)?;
        match tree.get(LATEST_KEY)? {
            Some(hash) => read_block(&tree, &hash),
            None => Ok(None),
        }
    }

    /// Reads a replica back in index order and verifies it.
    ///
    /// Returns `None` when nothing was stored for `address`.
    pub fn load_chain(&self, address: &str) -> Result<Option<Chain>> {
        let tree = self.db.open_tree(address)?;
        let mut blocks = Vec::new();
        for entry in tree.scan_prefix(b"height/") {
            let (key, hash) = entry?;
            let block = read_block(&tree, &hash)?.ok_or_else(|| {
                Error::CorruptStore(format!(
                    "{} points at a missing block",
                    String::from_utf8_lossy(&key)
                ))
            })?;
            blocks.push(block);
        }
        if blocks.is_empty() {
            return Ok(None);
        }
        Ok(Some(Chain::from_blocks(blocks)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ValidatorNode;
    use crate::tx::Transaction;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn temporary() -> ChainStore {
        ChainStore::from_db(sled::Config::new().temporary(true).open().unwrap())
    }

    fn grown_node() -> ValidatorNode {
        grow(ValidatorNode::new("node_0", 10, Block::genesis()), 3, |_| 1.0)
    }

    fn grow(mut node: ValidatorNode, rounds: usize, mut amount: impl FnMut(usize) -> f64) -> ValidatorNode {
        for round in 0..rounds {
            for i in 0..2 {
                let value = amount(round * 2 + i);
                node.receive_transaction(Transaction::new("a", format!("b{}{}", round, i), value));
            }
            let block = node.propose_block().unwrap().unwrap();
            node.commit_own_block(block).unwrap();
        }
        node
    }

    #[test]
    fn chain_round_trips_through_store() {
        let store = temporary();
        let node = grown_node();
        store.save_chain(node.address(), node.chain()).unwrap();

        let loaded = store.load_chain(node.address()).unwrap().unwrap();
        assert_eq!(&loaded, node.chain());
        let latest = store.get_latest(node.address()).unwrap().unwrap();
        assert_eq!(latest.hash(), node.head_hash().unwrap());
        assert_eq!(store.addresses().unwrap(), vec!["node_0".to_string()]);
    }

    #[test]
    fn unknown_replica_is_none() {
        let store = temporary();
        assert!(store.load_chain("nobody").unwrap().is_none());
        assert!(store.get_latest("nobody").unwrap().is_none());
        assert!(store.addresses().unwrap().is_empty());
    }

    #[test]
    fn tampered_store_fails_verification() {
        let store = temporary();
        let node = grown_node();
        store.save_chain(node.address(), node.chain()).unwrap();

        let tree = store.db.open_tree(node.address()).unwrap();
        let target = &node.chain().blocks()[2];
        let mut raw = serde_json::to_value(target).unwrap();
        raw["validator"] = serde_json::json!("mallory");
        tree.insert(target.hash().as_bytes(), serde_json::to_vec(&raw).unwrap())
            .unwrap();

        assert!(matches!(store.load_chain(node.address()), Err(Error::Chain(_))));
    }

    #[test]
    fn random_amounts_survive_the_store() {
        let store = temporary();
        let mut rng = StdRng::seed_from_u64(2024);
        let node = grow(
            ValidatorNode::new("node_0", 10, Block::genesis()).with_batch_size(50),
            40,
            |_| rng.gen_range(0.1..=10.0),
        );
        assert_eq!(node.chain().len(), 41);
        store.save_chain(node.address(), node.chain()).unwrap();

        let loaded = store.load_chain(node.address()).unwrap().unwrap();
        assert_eq!(&loaded, node.chain());
        for (stored, original) in loaded.blocks().iter().zip(node.chain().blocks()) {
            assert_eq!(stored.hash(), original.hash());
            for (a, b) in stored.transactions().iter().zip(original.transactions()) {
                assert_eq!(a.amount().to_bits(), b.amount().to_bits());
            }
        }
    }

    #[test]
    fn shorter_chain_replaces_longer_one() {
        let store = temporary();
        let genesis = Block::genesis();
        let long = grow(ValidatorNode::new("node_0", 10, genesis.clone()), 4, |_| 1.0);
        let short = grow(ValidatorNode::new("node_0", 10, genesis), 2, |_| 2.0);
        assert_eq!(long.chain().len(), 5);
        assert_eq!(short.chain().len(), 3);

        store.save_chain("node_0", long.chain()).unwrap();
        store.save_chain("node_0", short.chain()).unwrap();

        let loaded = store.load_chain("node_0").unwrap().unwrap();
        assert_eq!(&loaded, short.chain());
        let latest = store.get_latest("node_0").unwrap().unwrap();
        assert_eq!(latest.hash(), short.head_hash().unwrap());
    }

    #[test]
    fn non_finite_amounts_are_refused() {
        let store = temporary();
        let node = grow(ValidatorNode::new("node_0", 10, Block::genesis()), 1, |_| f64::NAN);
        assert!(matches!(
            store.save_chain(node.address(), node.chain()),
            Err(Error::CorruptStore(_))
        ));
        assert!(store.addresses().unwrap().is_empty());

        // An earlier good replica is left in place.
        let good = grown_node();
        store.save_chain("node_0", good.chain()).unwrap();
        assert!(store.save_chain("node_0", node.chain()).is_err());
        assert_eq!(&store.load_chain("node_0").unwrap().unwrap(), good.chain());
    }
}
