//! # Network Module
//!
//! The seams between the consensus core and the outside world. The actual
//! transport is out of scope for this crate — peers deliver signed ballot
//! bytes however they like — so this module defines the capability traits
//! the core depends on, the bounded intake queue, and the transaction
//! pool.
//!
//! ```text
//! mempool.rs — pending transaction pool with atomic add/remove/snapshot
//! queue.rs   — bounded inbound ballot queue with height-aware drop policy
//! mod.rs     — BallotSender / TransactionFetcher traits, loopback doubles
//! ```

pub mod mempool;
pub mod queue;

pub use mempool::TransactionPool;
pub use queue::BallotQueue;

use async_trait::async_trait;
use std::sync::Arc;

use crate::ballot::Ballot;
use crate::error::{Error, Result};
use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Broadcasts a signed ballot to every validator.
///
/// Implementations deliver to remote peers over whatever transport the
/// node runs; the consensus core only ever sees this trait.
#[async_trait]
pub trait BallotSender: Send + Sync {
    async fn broadcast(&self, ballot: &Ballot) -> Result<()>;
}

/// Pulls transactions a ballot references but the local pool is missing.
#[async_trait]
pub trait TransactionFetcher: Send + Sync {
    /// Fetch the given transaction hashes from peers. Implementations
    /// return the transactions they could resolve; absent entries are the
    /// caller's problem (retry, then vote NO).
    async fn fetch(&self, hashes: &[String]) -> Result<Vec<Transaction>>;
}

// ---------------------------------------------------------------------------
// In-process doubles
// ---------------------------------------------------------------------------

/// A sender for deployments with no peers (single-validator devnet).
///
/// Broadcast reaches peers only — the state manager re-queues its own
/// ballots itself — so with nobody listening there is nothing to do.
pub struct NullSender;

#[async_trait]
impl BallotSender for NullSender {
    async fn broadcast(&self, _ballot: &Ballot) -> Result<()> {
        Ok(())
    }
}

/// Delivers broadcast ballots straight into a local intake queue.
///
/// Test double standing in for the peers' side of the wire: what the
/// local node broadcasts comes back as if a peer had sent it.
pub struct LoopbackSender {
    queue: Arc<BallotQueue>,
}

impl LoopbackSender {
    pub fn new(queue: Arc<BallotQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl BallotSender for LoopbackSender {
    async fn broadcast(&self, ballot: &Ballot) -> Result<()> {
        self.queue.push(ballot.clone());
        Ok(())
    }
}

/// A fetcher for deployments with no peers. Every fetch fails, which
/// drives the checker into its NO-vote path for unresolvable ballots.
pub struct NullFetcher;

#[async_trait]
impl TransactionFetcher for NullFetcher {
    async fn fetch(&self, hashes: &[String]) -> Result<Vec<Transaction>> {
        match hashes.first() {
            Some(hash) => Err(Error::MissingTransaction(hash.clone())),
            None => Ok(Vec::new()),
        }
    }
}
