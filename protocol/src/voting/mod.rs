//! # Voting Primitives
//!
//! The vocabulary of the three-phase voting protocol: the ballot phase
//! ladder, the tri-state voting hole, and the voting basis that pins a
//! ballot to one proposal slot.
//!
//! Two ballots refer to the same slot iff their bases are equal — all five
//! fields, not just `(height, round)`. A node that disagrees about the
//! parent block hash is voting about a different world and must not land
//! in the same tally.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// BallotState
// ---------------------------------------------------------------------------

/// Phase of a ballot within one voting round.
///
/// Phases are strictly ordered: `INIT < SIGN < ACCEPT < ALLCONFIRM`.
/// `NONE` is the pre-protocol sentinel and sorts below everything.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum BallotState {
    /// No phase yet; the sentinel before the first INIT.
    #[default]
    #[serde(rename = "NONE")]
    None,
    /// The proposer's proposal broadcast.
    #[serde(rename = "INIT")]
    Init,
    /// First confirmation wave after local validation.
    #[serde(rename = "SIGN")]
    Sign,
    /// Second confirmation wave after SIGN quorum.
    #[serde(rename = "ACCEPT")]
    Accept,
    /// Terminal phase; an ACCEPT quorum finalizes the block.
    #[serde(rename = "ALLCONFIRM")]
    AllConfirm,
}

impl BallotState {
    /// The next phase up the ladder. `None` (the option) at the top.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::None => Some(Self::Init),
            Self::Init => Some(Self::Sign),
            Self::Sign => Some(Self::Accept),
            Self::Accept => Some(Self::AllConfirm),
            Self::AllConfirm => None,
        }
    }

    /// `true` for the phases a ballot may legitimately carry on the wire.
    pub fn is_wire_state(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for BallotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Init => "INIT",
            Self::Sign => "SIGN",
            Self::Accept => "ACCEPT",
            Self::AllConfirm => "ALLCONFIRM",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// VotingHole
// ---------------------------------------------------------------------------

/// A validator's verdict on a proposal.
///
/// `EXPIRED` is distinct from `NO`: it marks a proposer that failed to
/// produce in time rather than a proposal judged invalid. `NOTYET` is the
/// local sentinel before a decision is made; it is never admissible on an
/// inbound ballot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
pub enum VotingHole {
    /// No decision yet (local sentinel).
    #[default]
    #[serde(rename = "NOTYET")]
    NotYet,
    /// The proposal is valid.
    #[serde(rename = "YES")]
    Yes,
    /// The proposal is invalid.
    #[serde(rename = "NO")]
    No,
    /// The proposer failed to produce within the phase deadline.
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl VotingHole {
    /// `true` once a decision has been made.
    pub fn is_decided(self) -> bool {
        !matches!(self, Self::NotYet)
    }
}

impl fmt::Display for VotingHole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotYet => "NOTYET",
            Self::Yes => "YES",
            Self::No => "NO",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// Basis
// ---------------------------------------------------------------------------

/// The coordinate tuple identifying a proposal slot and its parent block.
///
/// Field order is canonical for signing; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Basis {
    /// Height of the parent block this round builds on.
    pub height: u64,
    /// Round number at this height; 0 for the first attempt.
    pub round: u32,
    /// Hash of the parent block.
    pub block_hash: String,
    /// Cumulative transaction count of the chain up to the parent.
    pub total_txs: u64,
    /// Cumulative operation count of the chain up to the parent.
    pub total_ops: u64,
}

impl Basis {
    /// Stable map key for the `(height, round)` slot.
    pub fn index(&self) -> String {
        format!("{}-{}", self.height, self.round)
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "basis(height={} round={} block={})",
            self.height, self.round, self.block_hash
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ballot_state_strict_order() {
        assert!(BallotState::Init < BallotState::Sign);
        assert!(BallotState::Sign < BallotState::Accept);
        assert!(BallotState::Accept < BallotState::AllConfirm);
        assert!(BallotState::None < BallotState::Init);
    }

    #[test]
    fn ballot_state_ladder() {
        let mut state = BallotState::Init;
        state = state.next().unwrap();
        assert_eq!(state, BallotState::Sign);
        state = state.next().unwrap();
        assert_eq!(state, BallotState::Accept);
        state = state.next().unwrap();
        assert_eq!(state, BallotState::AllConfirm);
        assert!(state.next().is_none());
    }

    #[test]
    fn wire_state_excludes_none() {
        assert!(!BallotState::None.is_wire_state());
        assert!(BallotState::Init.is_wire_state());
        assert!(BallotState::AllConfirm.is_wire_state());
    }

    #[test]
    fn state_serializes_as_upper_snake() {
        assert_eq!(
            serde_json::to_string(&BallotState::AllConfirm).unwrap(),
            "\"ALLCONFIRM\""
        );
        let back: BallotState = serde_json::from_str("\"SIGN\"").unwrap();
        assert_eq!(back, BallotState::Sign);
    }

    #[test]
    fn vote_serializes_as_upper() {
        assert_eq!(serde_json::to_string(&VotingHole::Expired).unwrap(), "\"EXPIRED\"");
        let back: VotingHole = serde_json::from_str("\"NOTYET\"").unwrap();
        assert_eq!(back, VotingHole::NotYet);
    }

    #[test]
    fn expired_is_not_no() {
        assert_ne!(VotingHole::Expired, VotingHole::No);
        assert!(VotingHole::Expired.is_decided());
        assert!(!VotingHole::NotYet.is_decided());
    }

    #[test]
    fn basis_equality_covers_all_fields() {
        let a = Basis {
            height: 3,
            round: 1,
            block_hash: "parent".into(),
            total_txs: 10,
            total_ops: 20,
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.block_hash = "other".into();
        assert_ne!(a, b);
    }

    #[test]
    fn basis_index_is_slot_scoped() {
        let a = Basis {
            height: 3,
            round: 1,
            ..Basis::default()
        };
        assert_eq!(a.index(), "3-1");
    }
}
