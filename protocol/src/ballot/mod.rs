//! # Ballot
//!
//! The signed message validators exchange during a voting round. One wire
//! shape serves every phase: the INIT ballot is the proposer's proposal,
//! and SIGN/ACCEPT/ALLCONFIRM ballots re-carry the proposal content with
//! the sender's own phase and vote.
//!
//! ## Wire format
//!
//! ```json
//! { "H": { "hash": "...", "signature": "..." },
//!   "B": { "proposer": "...", "from": "...",
//!          "proposed": { "basis": {...}, "transactions": ["..."],
//!                        "proposer_transaction": {...},
//!                        "proposed_time": "..." },
//!          "state": "INIT", "vote": "YES" } }
//! ```
//!
//! `hash` is base58(SHA-256(canonical `B`)); the signature covers
//! `network_id || canonical B` and is made by `from`. Field order in the
//! structs below is the canonical order — do not reorder fields.

pub mod proposer_transaction;

pub use proposer_transaction::ProposerTransaction;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::now_rfc3339;
use crate::config::Config;
use crate::crypto::hash::{object_hash, signing_payload};
use crate::crypto::keys::{Keypair, PublicKey, Signature};
use crate::error::{Error, Result};
use crate::voting::{BallotState, Basis, VotingHole};

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// Ballot header: content hash and sender signature, base58 strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BallotHeader {
    pub hash: String,
    pub signature: String,
}

/// The proposal content a ballot refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotProposed {
    /// The slot coordinates this ballot votes in.
    pub basis: Basis,
    /// Ordered hashes of the user transactions the proposer committed to.
    pub transactions: Vec<String>,
    /// The proposer's fee-and-inflation transaction.
    pub proposer_transaction: ProposerTransaction,
    /// RFC3339 timestamp set by the proposer; becomes the block's
    /// proposed time on finalize.
    pub proposed_time: String,
}

/// Signed fields of a ballot, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotBody {
    /// Address of the proposer whose proposal this ballot refers to.
    pub proposer: String,
    /// Address of the sender; signs the ballot.
    pub from: String,
    /// The proposal content.
    pub proposed: BallotProposed,
    /// Phase this ballot belongs to.
    pub state: BallotState,
    /// The sender's verdict.
    pub vote: VotingHole,
}

/// A signed ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "H")]
    pub h: BallotHeader,
    #[serde(rename = "B")]
    pub b: BallotBody,
}

impl Ballot {
    /// Builds an unsigned INIT-shaped ballot around a proposal.
    ///
    /// The state starts at INIT with an undecided vote; callers adjust with
    /// [`Ballot::set_vote`] and must [`Ballot::sign`] before sending.
    pub fn new(
        proposer: String,
        from: String,
        basis: Basis,
        transactions: Vec<String>,
        proposer_transaction: ProposerTransaction,
    ) -> Self {
        Self {
            h: BallotHeader::default(),
            b: BallotBody {
                proposer,
                from,
                proposed: BallotProposed {
                    basis,
                    transactions,
                    proposer_transaction,
                    proposed_time: now_rfc3339(),
                },
                state: BallotState::Init,
                vote: VotingHole::NotYet,
            },
        }
    }

    /// Builds a ballot voting EXPIRED on a proposer's absence at the given
    /// phase. Carries no proposal content.
    pub fn new_expired(proposer: String, from: String, basis: Basis, state: BallotState) -> Self {
        let mut ballot = Self::new(
            proposer,
            from,
            basis,
            Vec::new(),
            ProposerTransaction::empty(),
        );
        ballot.b.state = state;
        ballot.b.vote = VotingHole::Expired;
        ballot
    }

    /// Derives the sender's next-phase ballot from a proposal ballot.
    ///
    /// The proposal content is carried over verbatim; only `from`, the
    /// phase, and the vote change. The result is unsigned.
    pub fn next_phase(proposal: &Ballot, from: String, state: BallotState, vote: VotingHole) -> Self {
        let mut ballot = proposal.clone();
        ballot.h = BallotHeader::default();
        ballot.b.from = from;
        ballot.b.state = state;
        ballot.b.vote = vote;
        ballot
    }

    /// Sets the phase and vote on an unsigned ballot.
    pub fn set_vote(&mut self, state: BallotState, vote: VotingHole) {
        self.b.state = state;
        self.b.vote = vote;
    }

    /// Computes the body hash and signs `network_id || body` with the
    /// sender's key.
    pub fn sign(&mut self, keypair: &Keypair, network_id: &[u8]) {
        self.h.hash = object_hash(&self.b);
        let payload = signing_payload(network_id, &self.b);
        self.h.signature = keypair.sign(&payload).to_base58();
    }

    /// Verifies the stored hash and the sender's signature.
    pub fn verify(&self, network_id: &[u8]) -> Result<()> {
        if self.h.hash != object_hash(&self.b) {
            return Err(Error::BadForm("ballot hash mismatch".into()));
        }
        let from = PublicKey::from_address(&self.b.from)
            .map_err(|_| Error::BadForm(format!("invalid sender address: {}", self.b.from)))?;
        let signature =
            Signature::from_base58(&self.h.signature).map_err(|_| Error::BadSignature)?;
        let payload = signing_payload(network_id, &self.b);
        if !from.verify(&payload, &signature) {
            return Err(Error::BadSignature);
        }
        Ok(())
    }

    /// Structural validation of the ballot envelope.
    ///
    /// Covers the basis fields, the state/vote range (NOTYET is the local
    /// sentinel and inadmissible on the wire), and the transaction list.
    /// Proposer-transaction rules are a separate pipeline stage.
    pub fn is_well_formed(&self, config: &Config) -> Result<()> {
        if !self.b.state.is_wire_state() {
            return Err(Error::BadForm("ballot state NONE on the wire".into()));
        }
        if !self.b.vote.is_decided() {
            return Err(Error::BadForm("ballot vote NOTYET on the wire".into()));
        }
        if self.b.proposed.basis.block_hash.is_empty() {
            return Err(Error::BadForm("ballot basis without block hash".into()));
        }
        PublicKey::from_address(&self.b.proposer)
            .map_err(|_| Error::BadForm(format!("invalid proposer address: {}", self.b.proposer)))?;

        let txs = &self.b.proposed.transactions;
        if txs.len() > config.txs_limit {
            return Err(Error::BadForm(format!(
                "ballot carries {} transactions, limit is {}",
                txs.len(),
                config.txs_limit
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for hash in txs {
            if !seen.insert(hash.as_str()) {
                return Err(Error::BadForm(format!("duplicated transaction {}", hash)));
            }
        }
        if self.b.vote != VotingHole::Expired
            && txs
                .iter()
                .any(|h| h == self.b.proposed.proposer_transaction.hash())
        {
            return Err(Error::BadForm(
                "proposer transaction listed among user transactions".into(),
            ));
        }
        Ok(())
    }

    // -- Accessors ----------------------------------------------------------

    pub fn hash(&self) -> &str {
        &self.h.hash
    }

    pub fn proposer(&self) -> &str {
        &self.b.proposer
    }

    pub fn from(&self) -> &str {
        &self.b.from
    }

    pub fn basis(&self) -> &Basis {
        &self.b.proposed.basis
    }

    pub fn state(&self) -> BallotState {
        self.b.state
    }

    pub fn vote(&self) -> VotingHole {
        self.b.vote
    }

    pub fn transactions(&self) -> &[String] {
        &self.b.proposed.transactions
    }

    pub fn proposer_transaction(&self) -> &ProposerTransaction {
        &self.b.proposed.proposer_transaction
    }

    pub fn proposed_time(&self) -> &str {
        &self.b.proposed.proposed_time
    }

    /// Serializes the ballot to its wire JSON.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a ballot from wire JSON.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::BadForm(format!("ballot parse: {}", e)))
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ballot(from={} state={} vote={} {})",
            self.b.from,
            self.b.state,
            self.b.vote,
            self.b.proposed.basis
        )
    }
}
