//! Round driver: stake-weighted proposer selection followed by
//! propose, broadcast, validate and apply.
//!
//! The coordinator is the only component that sequences rounds. Each node
//! lives on its own worker; a round fans the sealed block out to every
//! non-proposer in parallel and collects one result per node. A rejection
//! by one node never stops the others.

use crate::blockchain::Block;
use crate::error::{Error, Result, ValidationError};
use crate::events::{EventSink, NodeEvent};
use crate::node::ValidatorNode;
use crate::selection::StakeSampler;
use crate::tx::Transaction;
use crate::worker::{spawn_node, NodeHandle, NodeSnapshot};
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Nodes each transaction is delivered to.
pub const DEFAULT_FANOUT: usize = 3;

/// What happened to the round's block on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The proposer appended its own block.
    Committed,
    /// The block passed validation and was appended.
    Applied,
    Rejected(ValidationError),
}

impl NodeOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, NodeOutcome::Rejected(_))
    }
}

#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub round: u64,
    /// Index of the selected node.
    pub proposer: usize,
    pub proposer_address: String,
    /// `None` when the proposer's mempool was empty.
    pub block: Option<Arc<Block>>,
    /// One entry per node, in node order. Empty when no block was proposed.
    pub results: Vec<(String, NodeOutcome)>,
}

impl RoundOutcome {
    pub fn accepted(&self) -> usize {
        self.results.iter().filter(|(_, o)| o.is_accepted()).count()
    }

    pub fn rejected(&self) -> impl Iterator<Item = (&str, &ValidationError)> {
        self.results.iter().filter_map(|(address, outcome)| match outcome {
            NodeOutcome::Rejected(error) => Some((address.as_str(), error)),
            _ => None,
        })
    }
}

pub struct Coordinator<R: Rng> {
    handles: Vec<NodeHandle>,
    tasks: Vec<JoinHandle<ValidatorNode>>,
    sampler: StakeSampler,
    rng: R,
    sink: Arc<dyn EventSink>,
    fanout: usize,
    round: u64,
}

impl<R: Rng> Coordinator<R> {
    /// Spawns one worker per node. Must be called inside a tokio runtime.
    ///
    /// Fails before anything is spawned if there are no nodes or the
    /// total stake is zero.
    pub fn new(
        nodes: Vec<ValidatorNode>,
        rng: R,
        sink: Arc<dyn EventSink>,
        fanout: usize,
    ) -> Result<Self> {
        let stakes: Vec<u64> = nodes.iter().map(ValidatorNode::stake).collect();
        let sampler = StakeSampler::new(&stakes)?;
        if fanout == 0 {
            return Err(Error::InvalidConfig("fanout must be at least 1".to_string()));
        }

        let (handles, tasks): (Vec<_>, Vec<_>) = nodes.into_iter().map(spawn_node).unzip();
        tracing::debug!(nodes = stakes.len(), total_stake = sampler.total_stake(), "coordinator started");
        Ok(Self {
            handles,
            tasks,
            sampler,
            rng,
            sink,
            fanout,
            round: 0,
        })
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.handles
    }

    /// Rounds started so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn total_stake(&self) -> u64 {
        self.sampler.total_stake()
    }

    /// Draws the next proposer by stake.
    pub fn select_validator(&mut self) -> usize {
        self.sampler.sample(&mut self.rng)
    }

    /// Hands `tx` to a random sample of `fanout` distinct nodes and returns
    /// their indices.
    pub async fn deliver(&mut self, tx: Transaction) -> Result<Vec<usize>> {
        let amount = self.fanout.min(self.handles.len());
        let targets = rand::seq::index::sample(&mut self.rng, self.handles.len(), amount).into_vec();
        for &target in &targets {
            let handle = &self.handles[target];
            self.sink.publish(&NodeEvent::TransactionReceived {
                node: handle.address().to_string(),
                sender: tx.sender().to_string(),
                recipient: tx.recipient().to_string(),
                amount: tx.amount(),
            });
            handle.receive_transaction(tx.clone()).await?;
        }
        Ok(targets)
    }

    /// Delivers `transactions`, selects a proposer and drives the round.
    pub async fn run_round(&mut self, transactions: Vec<Transaction>) -> Result<RoundOutcome> {
        for tx in transactions {
            self.deliver(tx).await?;
        }
        let proposer = self.select_validator();
        self.drive(proposer).await
    }

    /// Same as [`Coordinator::run_round`] with the proposer fixed.
    pub async fn run_round_with_proposer(
        &mut self,
        proposer: usize,
        transactions: Vec<Transaction>,
    ) -> Result<RoundOutcome> {
        if proposer >= self.handles.len() {
            return Err(Error::InvalidConfig(format!(
                "proposer {} out of range for {} nodes",
                proposer,
                self.handles.len()
            )));
        }
        for tx in transactions {
            self.deliver(tx).await?;
        }
        self.drive(proposer).await
    }

    /// Delivers a transaction to one specific node.
    pub async fn deliver_to(&self, node: usize, tx: Transaction) -> Result<()> {
        let handle = self
            .handles
            .get(node)
            .ok_or_else(|| Error::InvalidConfig(format!("node {} out of range", node)))?;
        self.sink.publish(&NodeEvent::TransactionReceived {
            node: handle.address().to_string(),
            sender: tx.sender().to_string(),
            recipient: tx.recipient().to_string(),
            amount: tx.amount(),
        });
        handle.receive_transaction(tx).await
    }

    async fn drive(&mut self, proposer: usize) -> Result<RoundOutcome> {
        self.round += 1;
        let round = self.round;
        let leader = &self.handles[proposer];
        let proposer_address = leader.address().to_string();

        self.sink.publish(&NodeEvent::ValidatorSelected {
            round,
            node: proposer_address.clone(),
            stake: leader.stake(),
        });

        let block = match leader.propose().await?.map_err(Error::Chain)? {
            Some(block) => Arc::new(block),
            None => {
                self.sink.publish(&NodeEvent::EmptyProposal {
                    round,
                    proposer: proposer_address.clone(),
                });
                return Ok(RoundOutcome {
                    round,
                    proposer,
                    proposer_address,
                    block: None,
                    results: Vec::new(),
                });
            }
        };

        self.sink.publish(&NodeEvent::BlockProposed {
            round,
            proposer: proposer_address.clone(),
            index: block.index(),
            hash: block.hash().to_string(),
            transactions: block.transactions().len(),
        });

        let deliveries = self.handles.iter().enumerate().map(|(i, handle)| {
            let block = Arc::clone(&block);
            async move {
                let outcome = if i == proposer {
                    match handle.commit_own(block).await? {
                        Ok(()) => NodeOutcome::Committed,
                        Err(error) => NodeOutcome::Rejected(error.into()),
                    }
                } else {
                    match handle.validate(block).await? {
                        Ok(()) => NodeOutcome::Applied,
                        Err(error) => NodeOutcome::Rejected(error),
                    }
                };
                Ok::<_, Error>((handle.address().to_string(), outcome))
            }
        });

        let mut results = Vec::with_capacity(self.handles.len());
        for delivery in join_all(deliveries).await {
            let (address, outcome) = delivery?;
            match &outcome {
                NodeOutcome::Rejected(error) => {
                    self.sink
                        .publish(&NodeEvent::rejected(round, &address, block.index(), error));
                }
                accepted => {
                    self.sink.publish(&NodeEvent::BlockApplied {
                        round,
                        node: address.clone(),
                        index: block.index(),
                        hash: block.hash().to_string(),
                        own: matches!(accepted, NodeOutcome::Committed),
                    });
                }
            }
            results.push((address, outcome));
        }

        Ok(RoundOutcome {
            round,
            proposer,
            proposer_address,
            block: Some(block),
            results,
        })
    }

    pub async fn snapshots(&self) -> Result<Vec<NodeSnapshot>> {
        let mut snapshots = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            snapshots.push(handle.snapshot().await?);
        }
        Ok(snapshots)
    }

    /// Stops every worker and returns the nodes in their original order.
    pub async fn shutdown(self) -> Result<Vec<ValidatorNode>> {
        drop(self.handles);
        let mut nodes = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            nodes.push(task.await.map_err(|error| Error::Worker(error.to_string()))?);
        }
        Ok(nodes)
    }
}
