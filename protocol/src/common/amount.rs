//! # Amount
//!
//! A monetary amount in the smallest indivisible unit of the native token.
//! Always an integer — no floating point anywhere near money — and all
//! arithmetic is checked. An overflow is a typed error, never a wrap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

use crate::error::{Error, Result};

/// A checked, copyable amount of the native token.
///
/// The inner value is intentionally private; construct with [`Amount::new`]
/// and combine with the checked operations. `Sum` is implemented for
/// iterator ergonomics but saturates into an overflow error at the first
/// failing addition via [`Amount::checked_sum`], which is what the fee
/// checker uses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Creates a new amount from a raw unit count.
    pub const fn new(value: u64) -> Self {
        Amount(value)
    }

    /// Returns the raw unit count.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns `true` if the amount is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(Error::AmountOverflow)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(Error::AmountOverflow)
    }

    /// Checked multiplication by a scalar count.
    pub fn checked_mul(self, count: u64) -> Result<Amount> {
        self.0
            .checked_mul(count)
            .map(Amount)
            .ok_or(Error::AmountOverflow)
    }

    /// Sums an iterator of amounts, failing on the first overflow.
    pub fn checked_sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Result<Amount> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sum for Amount {
    /// Saturating sum for display/diagnostic paths. Consensus-critical code
    /// uses [`Amount::checked_sum`] instead.
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Amount(iter.map(|a| a.0).fold(0u64, u64::saturating_add))
    }
}
