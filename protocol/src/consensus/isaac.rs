//! # ISAAC Consensus Core
//!
//! The authoritative local view of consensus: which `(height, round)` the
//! node is working on, the latest committed block anchoring the basis
//! window, and every running round still in play. The core accepts
//! validated ballots, tallies them, resolves thresholds, and prunes rounds
//! as the chain advances.
//!
//! The core is plain data plus methods — no locks, no tasks. Exactly one
//! owner (the state manager) mutates it; everything else goes through
//! messages to that owner.

use std::collections::HashMap;
use std::fmt;

use crate::ballot::Ballot;
use crate::config::Config;
use crate::consensus::running_round::RunningRound;
use crate::crypto::hash::object_hash;
use crate::storage::Block;
use crate::voting::{BallotState, Basis, VotingHole};

// ---------------------------------------------------------------------------
// IsaacState
// ---------------------------------------------------------------------------

/// The local consensus coordinates, monotone non-decreasing in
/// lexicographic `(height, round)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsaacState {
    pub height: u64,
    pub round: u32,
    pub ballot_state: BallotState,
}

impl fmt::Display for IsaacState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "isaac(height={} round={} state={})",
            self.height, self.round, self.ballot_state
        )
    }
}

/// Where a ballot's basis falls relative to the tracked window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisPlacement {
    /// In the current window; admissible.
    Current,
    /// Below the window; drop silently.
    Stale,
    /// Above the local height; the node is behind and must sync.
    Future,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// A threshold crossing reported by [`Isaac::check_threshold`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub basis: Basis,
    pub state: BallotState,
    pub vote: VotingHole,
    /// The proposer whose slot decided. For NO/EXPIRED outcomes this is
    /// the proposer that was expected to produce.
    pub proposer: String,
}

// ---------------------------------------------------------------------------
// Isaac
// ---------------------------------------------------------------------------

/// Multi-round, multi-proposer consensus state tracking.
pub struct Isaac {
    config: Config,
    state: IsaacState,
    latest_block: Block,
    /// Keyed by the full basis content hash: two bases that disagree on
    /// any field tally separately.
    running_rounds: HashMap<String, RunningRound>,
}

impl Isaac {
    /// Creates a core anchored at the given latest block, starting at
    /// round 0, phase INIT.
    pub fn new(config: Config, latest_block: Block) -> Self {
        let state = IsaacState {
            height: latest_block.height,
            round: 0,
            ballot_state: BallotState::Init,
        };
        Self {
            config,
            state,
            latest_block,
            running_rounds: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> IsaacState {
        self.state
    }

    pub fn latest_block(&self) -> &Block {
        &self.latest_block
    }

    /// Number of running rounds currently tracked.
    pub fn running_round_count(&self) -> usize {
        self.running_rounds.len()
    }

    /// Moves the local phase within the current round.
    pub fn set_ballot_state(&mut self, ballot_state: BallotState) {
        self.state.ballot_state = ballot_state;
    }

    /// Classifies a basis against the tracked window.
    pub fn placement(&self, basis: &Basis) -> BasisPlacement {
        if basis.height < self.state.height {
            return BasisPlacement::Stale;
        }
        if basis.height > self.state.height {
            return BasisPlacement::Future;
        }
        if basis.round < self.state.round {
            return BasisPlacement::Stale;
        }
        BasisPlacement::Current
    }

    /// Accepts a validated ballot into its running round.
    ///
    /// Idempotent: a duplicate `(from, basis, state)` changes no tally and
    /// returns `false`. The round is created lazily on the first ballot
    /// for a new basis, remembering `expected_proposer` as the slot's
    /// elected proposer.
    pub fn receive_ballot(&mut self, ballot: Ballot, expected_proposer: &str) -> bool {
        let key = object_hash(ballot.basis());
        match self.running_rounds.get_mut(&key) {
            Some(round) => round.vote(ballot),
            None => {
                self.running_rounds.insert(
                    key,
                    RunningRound::new(expected_proposer.to_string(), ballot),
                );
                true
            }
        }
    }

    /// Resolves a phase of a slot against the quorum threshold.
    ///
    /// Tallies are per declared proposer. A YES quorum for any proposer
    /// decides YES; if several proposers reach YES quorum at once (only
    /// possible under equivocation or partition recovery), the proposal
    /// with the lexicographically smallest ballot hash wins and the rest
    /// are discarded — their ballots stay in the log for audit. With no
    /// YES quorum, an EXPIRED or NO quorum on the expected proposer's
    /// slot decides the round the negative way.
    pub fn check_threshold(&self, basis: &Basis, state: BallotState) -> Option<Decision> {
        let round = self.running_rounds.get(&object_hash(basis))?;
        let threshold = self.config.quorum();

        let mut yes_winner: Option<(&String, String)> = None;
        let mut negative: Option<(VotingHole, &String)> = None;

        for (proposer, round_vote) in round.proposers() {
            match round_vote.result(state, threshold) {
                Some(VotingHole::Yes) => {
                    let order_key = round
                        .proposal(proposer)
                        .map(|b| b.hash().to_string())
                        .unwrap_or_else(|| proposer.clone());
                    let smaller = match &yes_winner {
                        Some((_, incumbent)) => order_key < *incumbent,
                        None => true,
                    };
                    if smaller {
                        yes_winner = Some((proposer, order_key));
                    }
                }
                Some(vote @ (VotingHole::No | VotingHole::Expired)) => {
                    // EXPIRED outranks NO for reporting; either abandons
                    // the round.
                    let replace = match negative {
                        Some((VotingHole::Expired, _)) => false,
                        _ => true,
                    };
                    if replace || vote == VotingHole::Expired {
                        negative = Some((vote, proposer));
                    }
                }
                _ => {}
            }
        }

        if let Some((proposer, _)) = yes_winner {
            return Some(Decision {
                basis: basis.clone(),
                state,
                vote: VotingHole::Yes,
                proposer: proposer.clone(),
            });
        }
        negative.map(|(vote, _)| Decision {
            basis: basis.clone(),
            state,
            vote,
            proposer: round.proposer.clone(),
        })
    }

    /// The winning proposal ballot for a slot and proposer, if observed.
    pub fn proposal(&self, basis: &Basis, proposer: &str) -> Option<&Ballot> {
        self.running_rounds
            .get(&object_hash(basis))?
            .proposal(proposer)
    }

    /// The running round for a basis, if any.
    pub fn running_round(&self, basis: &Basis) -> Option<&RunningRound> {
        self.running_rounds.get(&object_hash(basis))
    }

    /// Installs fresh tracking at `(height, round)` and discards every
    /// running round strictly below it.
    pub fn advance(&mut self, height: u64, round: u32) {
        self.state = IsaacState {
            height,
            round,
            ballot_state: BallotState::Init,
        };
        self.running_rounds.retain(|_, r| {
            r.basis.height > height || (r.basis.height == height && r.basis.round >= round)
        });
    }

    /// Anchors the core on a newly committed block and re-opens at
    /// `(block.height, 0, INIT)`.
    pub fn set_latest_block(&mut self, block: Block) {
        let height = block.height;
        self.latest_block = block;
        self.advance(height, 0);
    }
}
