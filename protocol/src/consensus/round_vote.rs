//! # Round Vote
//!
//! The per-(slot, proposer) tally. For every phase it maps each reporting
//! validator to its vote. Entries are append-only: a vote may be added,
//! never removed or re-cast, so counts are monotone by construction and a
//! crossed threshold stays crossed for the lifetime of the slot.

use std::collections::HashMap;

use crate::ballot::Ballot;
use crate::voting::{BallotState, VotingHole};

/// Vote counts of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoteCounts {
    pub yes: usize,
    pub no: usize,
    pub expired: usize,
}

impl VoteCounts {
    /// Total decided votes at this phase.
    pub fn total(&self) -> usize {
        self.yes + self.no + self.expired
    }
}

/// Append-only tally of votes for one proposer within one slot.
#[derive(Debug, Clone, Default)]
pub struct RoundVote {
    /// phase → (sender → vote). A sender appears at most once per phase.
    votes: HashMap<BallotState, HashMap<String, VotingHole>>,
}

impl RoundVote {
    /// Creates a tally seeded with the given ballot's vote.
    pub fn new(ballot: &Ballot) -> Self {
        let mut round_vote = Self::default();
        round_vote.vote(ballot);
        round_vote
    }

    /// Records the ballot sender's vote at the ballot's phase.
    ///
    /// Idempotent: a `(from, state)` pair that already voted is left
    /// untouched, whatever the new ballot claims — the first accepted
    /// ballot wins and conflicting re-casts are ignored. Returns `true`
    /// when the vote was newly recorded.
    pub fn vote(&mut self, ballot: &Ballot) -> bool {
        let by_sender = self.votes.entry(ballot.state()).or_default();
        if by_sender.contains_key(ballot.from()) {
            return false;
        }
        by_sender.insert(ballot.from().to_string(), ballot.vote());
        true
    }

    /// `true` if this sender already voted at the ballot's phase.
    pub fn is_voted(&self, ballot: &Ballot) -> bool {
        self.votes
            .get(&ballot.state())
            .is_some_and(|by_sender| by_sender.contains_key(ballot.from()))
    }

    /// Current counts at a phase.
    pub fn counts(&self, state: BallotState) -> VoteCounts {
        let mut counts = VoteCounts::default();
        if let Some(by_sender) = self.votes.get(&state) {
            for vote in by_sender.values() {
                match vote {
                    VotingHole::Yes => counts.yes += 1,
                    VotingHole::No => counts.no += 1,
                    VotingHole::Expired => counts.expired += 1,
                    VotingHole::NotYet => {}
                }
            }
        }
        counts
    }

    /// Resolves the phase against a threshold.
    ///
    /// YES wins with `yes >= threshold`. EXPIRED counts toward the NO side
    /// but is reported as EXPIRED when it alone crosses the threshold —
    /// the two outcomes advance the round either way, and the distinction
    /// is preserved for diagnostics.
    pub fn result(&self, state: BallotState, threshold: usize) -> Option<VotingHole> {
        let counts = self.counts(state);
        if counts.yes >= threshold {
            return Some(VotingHole::Yes);
        }
        if counts.expired >= threshold {
            return Some(VotingHole::Expired);
        }
        if counts.no + counts.expired >= threshold {
            return Some(VotingHole::No);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::ProposerTransaction;
    use crate::voting::Basis;

    fn vote_ballot(from: &str, state: BallotState, vote: VotingHole) -> Ballot {
        let mut ballot = Ballot::new(
            "proposer".into(),
            from.into(),
            Basis::default(),
            Vec::new(),
            ProposerTransaction::empty(),
        );
        ballot.set_vote(state, vote);
        ballot
    }

    #[test]
    fn counts_accumulate_per_phase() {
        let mut round_vote = RoundVote::new(&vote_ballot("n0", BallotState::Sign, VotingHole::Yes));
        round_vote.vote(&vote_ballot("n1", BallotState::Sign, VotingHole::Yes));
        round_vote.vote(&vote_ballot("n2", BallotState::Sign, VotingHole::No));
        round_vote.vote(&vote_ballot("n3", BallotState::Accept, VotingHole::Yes));

        let sign = round_vote.counts(BallotState::Sign);
        assert_eq!(sign, VoteCounts { yes: 2, no: 1, expired: 0 });
        assert_eq!(sign.total(), 3);

        let accept = round_vote.counts(BallotState::Accept);
        assert_eq!(accept.yes, 1);
    }

    #[test]
    fn duplicate_vote_does_not_change_tally() {
        let ballot = vote_ballot("n0", BallotState::Sign, VotingHole::Yes);
        let mut round_vote = RoundVote::new(&ballot);

        assert!(round_vote.is_voted(&ballot));
        assert!(!round_vote.vote(&ballot));
        assert_eq!(round_vote.counts(BallotState::Sign).yes, 1);
    }

    #[test]
    fn conflicting_recast_is_ignored() {
        let mut round_vote = RoundVote::new(&vote_ballot("n0", BallotState::Sign, VotingHole::Yes));
        // Same sender, same phase, different vote: first one stands.
        assert!(!round_vote.vote(&vote_ballot("n0", BallotState::Sign, VotingHole::No)));

        let counts = round_vote.counts(BallotState::Sign);
        assert_eq!(counts.yes, 1);
        assert_eq!(counts.no, 0);
    }

    #[test]
    fn threshold_hit_exactly_at_t() {
        let mut round_vote = RoundVote::default();
        let threshold = 3;

        round_vote.vote(&vote_ballot("n0", BallotState::Sign, VotingHole::Yes));
        round_vote.vote(&vote_ballot("n1", BallotState::Sign, VotingHole::Yes));
        assert_eq!(round_vote.result(BallotState::Sign, threshold), None);

        round_vote.vote(&vote_ballot("n2", BallotState::Sign, VotingHole::Yes));
        assert_eq!(
            round_vote.result(BallotState::Sign, threshold),
            Some(VotingHole::Yes)
        );

        // More votes do not change a crossed threshold.
        round_vote.vote(&vote_ballot("n3", BallotState::Sign, VotingHole::No));
        assert_eq!(
            round_vote.result(BallotState::Sign, threshold),
            Some(VotingHole::Yes)
        );
    }

    #[test]
    fn expired_counts_toward_no() {
        let mut round_vote = RoundVote::default();
        round_vote.vote(&vote_ballot("n0", BallotState::Init, VotingHole::No));
        round_vote.vote(&vote_ballot("n1", BallotState::Init, VotingHole::No));
        round_vote.vote(&vote_ballot("n2", BallotState::Init, VotingHole::Expired));

        assert_eq!(
            round_vote.result(BallotState::Init, 3),
            Some(VotingHole::No)
        );
    }

    #[test]
    fn pure_expired_quorum_reports_expired() {
        let mut round_vote = RoundVote::default();
        for i in 0..3 {
            round_vote.vote(&vote_ballot(
                &format!("n{}", i),
                BallotState::Init,
                VotingHole::Expired,
            ));
        }
        assert_eq!(
            round_vote.result(BallotState::Init, 3),
            Some(VotingHole::Expired)
        );
    }

    #[test]
    fn undecided_below_threshold() {
        let mut round_vote = RoundVote::default();
        round_vote.vote(&vote_ballot("n0", BallotState::Init, VotingHole::Yes));
        round_vote.vote(&vote_ballot("n1", BallotState::Init, VotingHole::No));
        assert_eq!(round_vote.result(BallotState::Init, 3), None);
    }
}
