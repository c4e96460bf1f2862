//! # Consensus Observer
//!
//! A small observer the node passes into the consensus machinery by
//! reference. The protocol crate never talks to a metrics registry
//! directly — the node binary implements this trait over its Prometheus
//! handles, tests implement it over counters, and the default
//! [`NullObserver`] does nothing.

use crate::common::Amount;
use crate::voting::{BallotState, Basis, VotingHole};

/// Receives consensus lifecycle events. All methods default to no-ops so
/// implementors override only what they chart.
pub trait ConsensusObserver: Send + Sync {
    /// An inbound ballot was discarded before tallying.
    fn ballot_dropped(&self, _reason: &str) {}

    /// A validated ballot entered the tally.
    fn ballot_tallied(&self, _state: BallotState, _vote: VotingHole) {}

    /// A phase crossed its threshold.
    fn decision_reached(&self, _basis: &Basis, _state: BallotState, _vote: VotingHole) {}

    /// The round was abandoned and re-opened at `round`.
    fn round_advanced(&self, _height: u64, _round: u32) {}

    /// A block was committed to storage.
    fn block_finalized(
        &self,
        _height: u64,
        _transactions: usize,
        _operations: usize,
        _fees: Amount,
        _inflation: Amount,
    ) {
    }

    /// Wall-clock seconds from the winning round's INIT open to the
    /// block commit.
    fn finalize_latency(&self, _seconds: f64) {}

    /// Cumulative count of ballots dropped by queue backpressure.
    fn queue_dropped_total(&self, _dropped: u64) {}
}

/// The do-nothing observer.
pub struct NullObserver;

impl ConsensusObserver for NullObserver {}
