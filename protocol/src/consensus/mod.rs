//! # Consensus Module
//!
//! The ISAAC BFT engine and everything that feeds it.
//!
//! ```text
//! round_vote.rs    — per-(slot, proposer) append-only vote tally
//! running_round.rs — everything observed for one (height, round) slot
//! isaac.rs         — multi-round core: tallies, thresholds, pruning
//! checker.rs       — staged validation pipeline for inbound ballots
//! proposer.rs      — proposer election (round-robin + test doubles)
//! state_manager.rs — single-owner task: timers, transitions, proposals
//! finalizer.rs     — applies an approved ballot to storage as a block
//! ```
//!
//! Data flow: network → checker → ISAAC tally → state manager →
//! next-phase ballot out, or finalizer → storage.

pub mod checker;
pub mod finalizer;
pub mod isaac;
pub mod proposer;
pub mod round_vote;
pub mod running_round;
pub mod state_manager;

pub use checker::{BallotChecker, CheckedBallot};
pub use finalizer::finalize;
pub use isaac::{BasisPlacement, Decision, Isaac, IsaacState};
pub use proposer::{FixedSelector, ProposerSelector, RoundRobinSelector};
pub use round_vote::{RoundVote, VoteCounts};
pub use running_round::RunningRound;
pub use state_manager::StateManager;
