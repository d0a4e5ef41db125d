//! Runs each validator as its own task.
//!
//! A worker exclusively owns its `ValidatorNode`; the rest of the process
//! talks to it through a [`NodeHandle`]. Commands are handled one at a
//! time, so transactions delivered to one node keep their arrival order
//! and a proposal always sees a consistent mempool and head. Only blocks
//! cross the boundary, behind an `Arc`, and the worker appends its own
//! value copy.

use crate::blockchain::Block;
use crate::error::{ChainError, Error, Result, ValidationError};
use crate::node::ValidatorNode;
use crate::tx::Transaction;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 64;

pub type ProposeResult = std::result::Result<Option<Block>, ChainError>;
pub type CommitResult = std::result::Result<(), ChainError>;
pub type ValidateResult = std::result::Result<(), ValidationError>;

/// Point-in-time view of a node used for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub address: String,
    pub stake: u64,
    pub height: u64,
    pub head_hash: String,
    pub chain_len: usize,
    pub mempool_len: usize,
}

impl NodeSnapshot {
    pub fn of(node: &ValidatorNode) -> Self {
        let chain = node.chain();
        Self {
            address: node.address().to_string(),
            stake: node.stake(),
            height: chain.height(),
            head_hash: node.head_hash().unwrap_or_default().to_string(),
            chain_len: chain.len(),
            mempool_len: node.mempool_len(),
        }
    }
}

pub enum NodeCommand {
    ReceiveTransaction(Transaction),
    Propose(oneshot::Sender<ProposeResult>),
    CommitOwn(Arc<Block>, oneshot::Sender<CommitResult>),
    Validate(Arc<Block>, oneshot::Sender<ValidateResult>),
    Snapshot(oneshot::Sender<NodeSnapshot>),
}

async fn receive<T>(from: &str, receiver: oneshot::Receiver<T>) -> Result<T> {
    receiver
        .await
        .map_err(|error| Error::ChannelFailure(from.to_string(), error.to_string()))
}

/// Cheap, cloneable front for one node worker.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    address: String,
    stake: u64,
    command_tx: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn stake(&self) -> u64 {
        self.stake
    }

    async fn send(&self, from: &str, command: NodeCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|error| Error::ChannelFailure(from.to_string(), error.to_string()))
    }

    pub async fn receive_transaction(&self, tx: Transaction) -> Result<()> {
        self.send("receive_transaction", NodeCommand::ReceiveTransaction(tx))
            .await
    }

    pub async fn propose(&self) -> Result<ProposeResult> {
        let (tx, rx) = oneshot::channel();
        self.send("propose", NodeCommand::Propose(tx)).await?;
        receive("propose", rx).await
    }

    pub async fn commit_own(&self, block: Arc<Block>) -> Result<CommitResult> {
        let (tx, rx) = oneshot::channel();
        self.send("commit_own", NodeCommand::CommitOwn(block, tx))
            .await?;
        receive("commit_own", rx).await
    }

    pub async fn validate(&self, block: Arc<Block>) -> Result<ValidateResult> {
        let (tx, rx) = oneshot::channel();
        self.send("validate", NodeCommand::Validate(block, tx))
            .await?;
        receive("validate", rx).await
    }

    pub async fn snapshot(&self) -> Result<NodeSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send("snapshot", NodeCommand::Snapshot(tx)).await?;
        receive("snapshot", rx).await
    }
}

/// Moves `node` onto its own task. The task hands the node back once every
/// handle has been dropped.
pub fn spawn_node(node: ValidatorNode) -> (NodeHandle, JoinHandle<ValidatorNode>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = NodeHandle {
        address: node.address().to_string(),
        stake: node.stake(),
        command_tx,
    };
    let task = tokio::spawn(run(node, command_rx));
    (handle, task)
}

async fn run(mut node: ValidatorNode, mut receiver: mpsc::Receiver<NodeCommand>) -> ValidatorNode {
    while let Some(command) = receiver.recv().await {
        match command {
            NodeCommand::ReceiveTransaction(tx) => {
                node.receive_transaction(tx);
            }
            NodeCommand::Propose(reply) => {
                if reply.send(node.propose_block()).is_err() {
                    tracing::warn!(node = node.address(), "propose reply dropped");
                }
            }
            NodeCommand::CommitOwn(block, reply) => {
                let result = node.commit_own_block(Block::clone(&block));
                if reply.send(result).is_err() {
                    tracing::warn!(node = node.address(), "commit reply dropped");
                }
            }
            NodeCommand::Validate(block, reply) => {
                let result = node.validate_and_apply(&block);
                if reply.send(result).is_err() {
                    tracing::warn!(node = node.address(), "validate reply dropped");
                }
            }
            NodeCommand::Snapshot(reply) => {
                if reply.send(NodeSnapshot::of(&node)).is_err() {
                    tracing::warn!(node = node.address(), "snapshot reply dropped");
                }
            }
        }
    }
    tracing::trace!(node = node.address(), "worker stopped");
    node
}
