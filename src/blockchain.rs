use crate::error::ChainError;
use crate::tx::Transaction;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Predecessor hash carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// Validator name carried by the genesis block.
pub const GENESIS_VALIDATOR: &str = "genesis";

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn prefix(s: &str, len: usize) -> &str {
    match s.char_indices().nth(len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Represents a block in the blockchain.
///
/// Sealed at construction: the hash is computed once over every other
/// field and recipients recompute it to detect tampering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Block {
    /// Position in the chain, genesis is 0.
    index: u64,
    /// Creation time in unix milliseconds.
    timestamp: i64,
    /// Value copies of the included transactions, in mempool order.
    transactions: Vec<Transaction>,
    /// The hash of the parent block.
    previous_hash: String,
    /// Address of the proposing node.
    validator: String,
    /// The cached hash of the block.
    hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        transactions: &[Transaction],
        previous_hash: impl Into<String>,
        validator: impl Into<String>,
    ) -> Self {
        Self::with_timestamp(
            index,
            transactions,
            previous_hash,
            validator,
            Utc::now().timestamp_millis(),
        )
    }

    pub fn with_timestamp(
        index: u64,
        transactions: &[Transaction],
        previous_hash: impl Into<String>,
        validator: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions: transactions.to_vec(),
            previous_hash: previous_hash.into(),
            validator: validator.into(),
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Builds the fixed first block every replica starts from.
    pub fn genesis() -> Self {
        Self::new(0, &[], GENESIS_PREVIOUS_HASH, GENESIS_VALIDATOR)
    }

    /// Canonical mapping of every field except the hash itself.
    fn to_record(&self) -> Value {
        let transactions: Vec<Value> = self.transactions.iter().map(Transaction::to_record).collect();
        json!({
            "index": self.index,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": transactions,
            "validator": self.validator,
        })
    }

    /// SHA-256 over the canonical record, hex encoded.
    pub fn compute_hash(&self) -> String {
        sha256_hex(self.to_record().to_string().as_bytes())
    }

    /// Recomputes the hash and compares it with the stored one.
    pub fn verify_hash(&self) -> Result<(), String> {
        let computed = self.compute_hash();
        if computed == self.hash {
            Ok(())
        } else {
            Err(computed)
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn validator(&self) -> &str {
        &self.validator
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
            && self.previous_hash == GENESIS_PREVIOUS_HASH
            && self.validator == GENESIS_VALIDATOR
            && self.transactions.is_empty()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {} | By: {}... | Txns: {} | Hash: {}...",
            self.index,
            prefix(&self.validator, 10),
            self.transactions.len(),
            prefix(&self.hash, 15)
        )
    }
}

/// One node's replica of the chain. Append only.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    /// Creates a replica with a freshly stamped genesis block.
    pub fn new() -> Self {
        Self::from_genesis(Block::genesis())
    }

    /// Seeds a replica from a genesis block shared by value across nodes.
    pub fn from_genesis(genesis: Block) -> Self {
        Self {
            blocks: vec![genesis],
        }
    }

    /// Rebuilds a replica from stored blocks and checks it end to end.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, ChainError> {
        let chain = Self { blocks };
        chain.verify()?;
        Ok(chain)
    }

    pub fn latest(&self) -> Result<&Block, ChainError> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    pub fn genesis(&self) -> Result<&Block, ChainError> {
        self.blocks.first().ok_or(ChainError::EmptyChain)
    }

    /// Appends `block` if it links to the current head.
    ///
    /// The block hash is not re-verified here; callers accepting blocks
    /// from other nodes check integrity first.
    pub fn try_append(&mut self, block: Block) -> Result<(), ChainError> {
        let head = self.latest()?;
        if block.previous_hash != head.hash {
            return Err(ChainError::LinkageMismatch {
                index: block.index,
                expected: head.hash.clone(),
                found: block.previous_hash,
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Checks the genesis shape, then integrity, index continuity and
    /// linkage of every block.
    pub fn verify(&self) -> Result<(), ChainError> {
        let genesis = self.genesis()?;
        if !genesis.is_genesis() {
            return Err(ChainError::InvalidGenesis {
                index: genesis.index,
                previous_hash: genesis.previous_hash.clone(),
                validator: genesis.validator.clone(),
            });
        }
        for block in &self.blocks {
            block
                .verify_hash()
                .map_err(|computed| ChainError::CorruptBlock {
                    index: block.index,
                    stored: block.hash.clone(),
                    computed,
                })?;
        }
        for (position, pair) in self.blocks.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.index != prev.index + 1 {
                return Err(ChainError::IndexMismatch {
                    position: position + 1,
                    expected: prev.index + 1,
                    found: next.index,
                });
            }
            if next.previous_hash != prev.hash {
                return Err(ChainError::LinkageMismatch {
                    index: next.index,
                    expected: prev.hash.clone(),
                    found: next.previous_hash.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Index of the head block.
    pub fn height(&self) -> u64 {
        self.blocks.last().map(|b| b.index).unwrap_or_default()
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}
