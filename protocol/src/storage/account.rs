//! Account records: address, balance, and the sequence id that orders a
//! source's transactions.

use serde::{Deserialize, Serialize};

use crate::common::Amount;
use crate::error::{Error, Result};

/// On-chain state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAccount {
    /// base58 address (the account's public key).
    pub address: String,
    /// Current balance in base units.
    pub balance: Amount,
    /// Must be matched by the next transaction from this account; bumped
    /// on every applied transaction.
    pub sequence_id: u64,
}

impl BlockAccount {
    /// Creates an account with an opening balance.
    pub fn new(address: String, balance: Amount) -> Self {
        Self {
            address,
            balance,
            sequence_id: 0,
        }
    }

    /// Credits the account. Overflow is an [`Error::AmountOverflow`].
    pub fn credit(&mut self, amount: Amount) -> Result<()> {
        self.balance = self.balance.checked_add(amount)?;
        Ok(())
    }

    /// Debits the account. A shortfall is an
    /// [`Error::InsufficientBalance`].
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .map_err(|_| Error::InsufficientBalance {
                address: self.address.clone(),
            })?;
        Ok(())
    }
}
