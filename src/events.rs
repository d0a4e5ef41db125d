//! Structured notifications published by the coordinator.
//!
//! Domain code never prints; whoever wants to observe a run subscribes a
//! sink.

use crate::error::ValidationError;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NodeEvent {
    TransactionReceived {
        node: String,
        sender: String,
        recipient: String,
        amount: f64,
    },
    ValidatorSelected {
        round: u64,
        node: String,
        stake: u64,
    },
    BlockProposed {
        round: u64,
        proposer: String,
        index: u64,
        hash: String,
        transactions: usize,
    },
    EmptyProposal {
        round: u64,
        proposer: String,
    },
    BlockApplied {
        round: u64,
        node: String,
        index: u64,
        hash: String,
        own: bool,
    },
    BlockRejected {
        round: u64,
        node: String,
        index: u64,
        reason: String,
    },
}

impl NodeEvent {
    pub(crate) fn rejected(round: u64, node: &str, index: u64, error: &ValidationError) -> Self {
        NodeEvent::BlockRejected {
            round,
            node: node.to_string(),
            index,
            reason: error.to_string(),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: &NodeEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: &NodeEvent) {}
}

/// Renders events as `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &NodeEvent) {
        match event {
            NodeEvent::TransactionReceived {
                node,
                sender,
                recipient,
                amount,
            } => {
                tracing::debug!(%node, %sender, %recipient, amount, "transaction received");
            }
            NodeEvent::ValidatorSelected { round, node, stake } => {
                tracing::info!(round, %node, stake, "validator selected");
            }
            NodeEvent::BlockProposed {
                round,
                proposer,
                index,
                hash,
                transactions,
            } => {
                tracing::info!(round, %proposer, index, %hash, transactions, "block proposed");
            }
            NodeEvent::EmptyProposal { round, proposer } => {
                tracing::info!(round, %proposer, "validator had no transactions, skipping proposal");
            }
            NodeEvent::BlockApplied {
                round,
                node,
                index,
                hash,
                own,
            } => {
                tracing::debug!(round, %node, index, %hash, own, "block applied");
            }
            NodeEvent::BlockRejected {
                round,
                node,
                index,
                reason,
            } => {
                tracing::warn!(round, %node, index, %reason, "block rejected");
            }
        }
    }
}

/// Forwards events to a channel subscriber. A closed receiver is ignored.
impl EventSink for mpsc::UnboundedSender<NodeEvent> {
    fn publish(&self, event: &NodeEvent) {
        if self.send(event.clone()).is_err() {
            tracing::trace!("event subscriber dropped");
        }
    }
}
