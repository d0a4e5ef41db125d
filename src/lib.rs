//! Single-process Proof-of-Stake network simulator.
//!
//! Validators take turns proposing blocks, picked at random by stake. Every
//! node keeps its own replica of the chain and advances it only after
//! re-checking each block it receives.

pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod error;
pub mod events;
pub mod generator;
pub mod node;
pub mod selection;
pub mod store;
pub mod tx;
pub mod worker;

pub use crate::blockchain::{Block, Chain};
pub use crate::config::SimulationConfig;
pub use crate::consensus::{Coordinator, NodeOutcome, RoundOutcome};
pub use crate::error::{ChainError, Error, Result, ValidationError};
pub use crate::events::{EventSink, NodeEvent, NoopSink, TracingSink};
pub use crate::node::ValidatorNode;
pub use crate::selection::{select_validator, StakeSampler};
pub use crate::store::ChainStore;
pub use crate::tx::Transaction;
pub use crate::worker::{NodeHandle, NodeSnapshot};
