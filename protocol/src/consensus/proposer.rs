//! # Proposer Selection
//!
//! A small capability trait mapping `(height, round)` to the validator
//! expected to propose in that slot. The default walks the sorted
//! validator set round-robin; tests pin the choice with
//! [`FixedSelector`].

/// Elects the proposer for a slot.
pub trait ProposerSelector: Send + Sync {
    /// Returns the address of the proposer for `(height, round)`.
    ///
    /// `validators` is the full configured set; implementations must be
    /// deterministic — every honest node must elect the same proposer.
    fn select(&self, validators: &[String], height: u64, round: u32) -> String;
}

/// Deterministic round-robin over the sorted validator set.
///
/// Sorting makes the walk independent of configuration file order, and
/// adding the round number re-elects a fresh proposer after every expiry
/// at the same height.
pub struct RoundRobinSelector;

impl ProposerSelector for RoundRobinSelector {
    fn select(&self, validators: &[String], height: u64, round: u32) -> String {
        if validators.is_empty() {
            return String::new();
        }
        let mut sorted: Vec<&String> = validators.iter().collect();
        sorted.sort_unstable();
        let index = ((height + round as u64) % sorted.len() as u64) as usize;
        sorted[index].clone()
    }
}

/// Always elects the same proposer. Test double.
pub struct FixedSelector(pub String);

impl ProposerSelector for FixedSelector {
    fn select(&self, _validators: &[String], _height: u64, _round: u32) -> String {
        self.0.clone()
    }
}
