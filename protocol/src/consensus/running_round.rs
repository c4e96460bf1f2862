//! # Running Round
//!
//! Everything observed for one `(height, round)` slot, regardless of which
//! proposer a ballot declares. One expected proposer is elected per slot,
//! but a Byzantine peer may declare itself proposer or sign two distinct
//! proposals — so tallies are kept per declared proposer, every proposal
//! is retained, and the full ballot log is kept for audit.
//!
//! Pure data structure: only the consensus owner mutates it, so there is
//! no lock here.

use std::collections::HashMap;

use crate::ballot::Ballot;
use crate::consensus::round_vote::RoundVote;
use crate::voting::{BallotState, Basis};

/// All state of one voting slot.
#[derive(Debug, Clone)]
pub struct RunningRound {
    /// The slot coordinates shared by every ballot in this round.
    pub basis: Basis,
    /// The proposer elected for this slot by the local selector.
    pub proposer: String,
    /// Declared proposer → the transaction list of its first proposal.
    transactions: HashMap<String, Vec<String>>,
    /// Declared proposer → all INIT proposals observed from it.
    proposals: HashMap<String, Vec<Ballot>>,
    /// Declared proposer → tally over that proposer's slot.
    voted: HashMap<String, RoundVote>,
    /// Every ballot observed for this slot, in arrival order.
    ballots: Vec<Ballot>,
}

impl RunningRound {
    /// Opens a running round with its first ballot.
    pub fn new(expected_proposer: String, ballot: Ballot) -> Self {
        let mut round = Self {
            basis: ballot.basis().clone(),
            proposer: expected_proposer,
            transactions: HashMap::new(),
            proposals: HashMap::new(),
            voted: HashMap::new(),
            ballots: Vec::new(),
        };
        round.vote(ballot);
        round
    }

    /// `true` if the ballot's `(from, state)` was already tallied for its
    /// declared proposer.
    pub fn is_voted(&self, ballot: &Ballot) -> bool {
        self.voted
            .get(ballot.proposer())
            .is_some_and(|round_vote| round_vote.is_voted(ballot))
    }

    /// Records a ballot: tallies its vote and, for INIT proposals, retains
    /// the proposal content. Returns `true` when the vote was newly
    /// recorded.
    ///
    /// Proposal content is retained even when the tally slot is already
    /// taken — an equivocating proposer's conflicting proposals must all
    /// be visible to the tie-break.
    pub fn vote(&mut self, ballot: Ballot) -> bool {
        let recorded = self
            .voted
            .entry(ballot.proposer().to_string())
            .or_default()
            .vote(&ballot);

        if ballot.state() == BallotState::Init && ballot.from() == ballot.proposer() {
            self.transactions
                .entry(ballot.proposer().to_string())
                .or_insert_with(|| ballot.transactions().to_vec());
            let proposals = self
                .proposals
                .entry(ballot.proposer().to_string())
                .or_default();
            if !proposals.iter().any(|b| b.hash() == ballot.hash()) {
                proposals.push(ballot.clone());
            }
        }

        self.ballots.push(ballot);
        recorded
    }

    /// The tally for one declared proposer.
    pub fn round_vote(&self, proposer: &str) -> Option<&RoundVote> {
        self.voted.get(proposer)
    }

    /// The winning proposal of a proposer: the lexicographically smallest
    /// ballot hash among everything it signed for this slot. A proposer
    /// that equivocates pins itself to one deterministic proposal.
    pub fn proposal(&self, proposer: &str) -> Option<&Ballot> {
        self.proposals
            .get(proposer)?
            .iter()
            .min_by(|a, b| a.hash().cmp(b.hash()))
    }

    /// The transaction list a proposer first committed to.
    pub fn transactions(&self, proposer: &str) -> Option<&[String]> {
        self.transactions.get(proposer).map(Vec::as_slice)
    }

    /// Every declared proposer seen in this slot.
    pub fn proposers(&self) -> impl Iterator<Item = (&String, &RoundVote)> {
        self.voted.iter()
    }

    /// `true` if this proposer equivocated: more than one distinct INIT
    /// proposal for the same slot.
    pub fn is_equivocating(&self, proposer: &str) -> bool {
        self.proposals
            .get(proposer)
            .map(|proposals| {
                let mut hashes: Vec<&str> = proposals.iter().map(|b| b.hash()).collect();
                hashes.sort_unstable();
                hashes.dedup();
                hashes.len() > 1
            })
            .unwrap_or(false)
    }

    /// The ordered log of every ballot received for this slot.
    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }
}
