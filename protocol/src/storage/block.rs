//! # Block Record
//!
//! A block is the unit the finalizer commits: the two proposer-transaction
//! operations followed by the operations of every referenced user
//! transaction, anchored to a parent by hash.
//!
//! The block hash is base58(SHA-256) over the deterministic content fields
//! only — the locally observed `confirmed_time` is excluded so that every
//! validator derives the same hash for the same finalized ballot.

use serde::{Deserialize, Serialize};

use crate::ballot::Ballot;
use crate::common::now_rfc3339;
use crate::crypto::hash::object_hash;
use crate::voting::Basis;

/// Proposed time recorded in the genesis block. A fixed constant so that
/// every node derives the same genesis hash from the same configuration.
pub const GENESIS_PROPOSED_TIME: &str = "2026-01-01T00:00:00.000000Z";

/// A finalized block record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Chain height; genesis is height 1.
    pub height: u64,
    /// base58(SHA-256) over the content fields.
    pub hash: String,
    /// Hash of the parent block; empty for genesis.
    pub parent: String,
    /// Address of the proposer whose proposal was finalized.
    pub proposer: String,
    /// Round in which the proposal reached quorum.
    pub round: u32,
    /// RFC3339 time set by the proposer.
    pub proposed_time: String,
    /// RFC3339 time this node finalized the block. Local, not hashed.
    pub confirmed_time: String,
    /// Ordered user transaction hashes.
    pub transactions: Vec<String>,
    /// Hash of the proposer transaction.
    pub proposer_transaction: String,
    /// Cumulative transaction count including this block.
    pub total_txs: u64,
    /// Cumulative operation count including this block.
    pub total_ops: u64,
}

/// The hashed subset of a block's fields, in canonical order.
#[derive(Serialize)]
struct BlockContent<'a> {
    height: u64,
    parent: &'a str,
    proposer: &'a str,
    round: u32,
    proposed_time: &'a str,
    transactions: &'a [String],
    proposer_transaction: &'a str,
    total_txs: u64,
    total_ops: u64,
}

impl Block {
    /// Constructs the genesis block for a chain.
    ///
    /// Deterministic: two nodes configured identically derive the same
    /// genesis hash. Carries no transactions; the genesis and common
    /// accounts are bootstrapped alongside it by the storage layer.
    pub fn genesis() -> Self {
        let mut block = Block {
            height: 1,
            hash: String::new(),
            parent: String::new(),
            proposer: String::new(),
            round: 0,
            proposed_time: GENESIS_PROPOSED_TIME.to_string(),
            confirmed_time: GENESIS_PROPOSED_TIME.to_string(),
            transactions: Vec::new(),
            proposer_transaction: String::new(),
            total_txs: 0,
            total_ops: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Composes the block a finalized ballot describes.
    ///
    /// Parent and height come from the ballot's basis; the operation count
    /// is supplied by the finalizer after resolving the referenced
    /// transactions (2 proposer operations plus each transaction's own).
    pub fn from_ballot(ballot: &Ballot, operation_count: u64) -> Self {
        let basis: &Basis = ballot.basis();
        let mut block = Block {
            height: basis.height + 1,
            hash: String::new(),
            parent: basis.block_hash.clone(),
            proposer: ballot.proposer().to_string(),
            round: basis.round,
            proposed_time: ballot.proposed_time().to_string(),
            confirmed_time: now_rfc3339(),
            transactions: ballot.transactions().to_vec(),
            proposer_transaction: ballot.proposer_transaction().hash().to_string(),
            total_txs: basis.total_txs + ballot.transactions().len() as u64,
            total_ops: basis.total_ops + operation_count,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Recomputes the content hash of this block.
    pub fn compute_hash(&self) -> String {
        object_hash(&BlockContent {
            height: self.height,
            parent: &self.parent,
            proposer: &self.proposer,
            round: self.round,
            proposed_time: &self.proposed_time,
            transactions: &self.transactions,
            proposer_transaction: &self.proposer_transaction,
            total_txs: self.total_txs,
            total_ops: self.total_ops,
        })
    }

    /// The voting basis that builds on top of this block.
    pub fn next_basis(&self, round: u32) -> Basis {
        Basis {
            height: self.height,
            round,
            block_hash: self.hash.clone(),
            total_txs: self.total_txs,
            total_ops: self.total_ops,
        }
    }
}
