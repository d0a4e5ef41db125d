use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by a chain replica.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain has no blocks")]
    EmptyChain,
    #[error("block {index} links to {found}, local head is {expected}")]
    LinkageMismatch {
        index: u64,
        expected: String,
        found: String,
    },
    #[error("first block is not a genesis block: index {index}, previous hash {previous_hash}, validator {validator}")]
    InvalidGenesis {
        index: u64,
        previous_hash: String,
        validator: String,
    },
    #[error("block at position {position} has index {found}, expected {expected}")]
    IndexMismatch {
        position: usize,
        expected: u64,
        found: u64,
    },
    #[error("block {index} hash is corrupt: stored {stored}, computed {computed}")]
    CorruptBlock {
        index: u64,
        stored: String,
        computed: String,
    },
}

/// Reasons a node refuses a block received from another node.
///
/// A rejection is recovered locally: the node keeps its current head and
/// carries on with the next round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("block {index} hash is corrupt: stored {stored}, computed {computed}")]
    CorruptBlock {
        index: u64,
        stored: String,
        computed: String,
    },
    #[error("block {index} previous hash {found} does not match local head {expected}")]
    LinkageMismatch {
        index: u64,
        expected: String,
        found: String,
    },
    #[error("local chain has no blocks")]
    EmptyChain,
    #[error(transparent)]
    Chain(ChainError),
}

impl From<ChainError> for ValidationError {
    fn from(error: ChainError) -> Self {
        match error {
            ChainError::EmptyChain => ValidationError::EmptyChain,
            ChainError::LinkageMismatch {
                index,
                expected,
                found,
            } => ValidationError::LinkageMismatch {
                index,
                expected,
                found,
            },
            other => ValidationError::Chain(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no validators configured")]
    NoValidators,
    #[error("total stake across validators is zero")]
    ZeroTotalStake,
    #[error("total stake overflows u64")]
    StakeOverflow,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt store: {0}")]
    CorruptStore(String),
    #[error("channel failure for: {0} - failure: {1}")]
    ChannelFailure(String, String),
    #[error("worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
}
