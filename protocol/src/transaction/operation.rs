//! # Operations
//!
//! The atomic state changes a transaction can carry. User transactions are
//! built from [`CreateAccount`] and [`Payment`]; the proposer transaction
//! alone carries [`CollectTxFee`] and [`Inflation`].
//!
//! On the wire an operation is internally tagged:
//!
//! ```json
//! { "type": "Payment", "target": "...", "amount": 100 }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::Amount;
use crate::config::{Config, BASE_RESERVE};
use crate::crypto::hash::object_hash;
use crate::crypto::keys::PublicKey;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Operation bodies
// ---------------------------------------------------------------------------

/// Creates a new account funded from the transaction source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccount {
    /// Address of the account to create.
    pub target: String,
    /// Initial balance; must cover the base reserve.
    pub amount: Amount,
}

/// Moves value from the transaction source to an existing account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Receiving address.
    pub target: String,
    /// Amount to transfer.
    pub amount: Amount,
}

/// Collects the fees of every transaction in a proposed block into the
/// common account. Only valid inside a proposer transaction.
///
/// The `height`, `block_hash`, and `total_txs` fields must match the
/// voting basis of the carrying ballot; they pin the collection to one
/// specific parent block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectTxFee {
    /// The common account address.
    pub target: String,
    /// Sum of fees over the referenced transactions.
    pub amount: Amount,
    /// Height of the parent block.
    pub height: u64,
    /// Hash of the parent block.
    pub block_hash: String,
    /// Cumulative transaction count up to the parent block.
    pub total_txs: u64,
    /// Number of transactions whose fees are collected.
    pub txs: u64,
}

/// Mints the per-block inflation amount into the common account. Only
/// valid inside a proposer transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inflation {
    /// The common account address.
    pub target: String,
    /// Inflation amount per the schedule; zero after the end height.
    pub amount: Amount,
    /// Height of the parent block.
    pub height: u64,
    /// Hash of the parent block.
    pub block_hash: String,
    /// Cumulative transaction count up to the parent block.
    pub total_txs: u64,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A single operation, dispatched by its wire tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    CreateAccount(CreateAccount),
    Payment(Payment),
    CollectTxFee(CollectTxFee),
    Inflation(Inflation),
}

impl Operation {
    /// Canonical content hash, used for duplicate-operation detection.
    pub fn hash(&self) -> String {
        object_hash(self)
    }

    /// The address credited by this operation.
    pub fn target(&self) -> &str {
        match self {
            Self::CreateAccount(op) => &op.target,
            Self::Payment(op) => &op.target,
            Self::CollectTxFee(op) => &op.target,
            Self::Inflation(op) => &op.target,
        }
    }

    /// The amount moved or minted by this operation.
    pub fn amount(&self) -> Amount {
        match self {
            Self::CreateAccount(op) => op.amount,
            Self::Payment(op) => op.amount,
            Self::CollectTxFee(op) => op.amount,
            Self::Inflation(op) => op.amount,
        }
    }

    /// `true` for operations only a proposer transaction may carry.
    pub fn is_proposer_only(&self) -> bool {
        matches!(self, Self::CollectTxFee(_) | Self::Inflation(_))
    }

    /// Structural validation independent of chain state.
    pub fn is_well_formed(&self, _config: &Config) -> Result<()> {
        PublicKey::from_address(self.target())
            .map_err(|_| Error::BadForm(format!("invalid target address: {}", self.target())))?;

        match self {
            Self::CreateAccount(op) => {
                if op.amount < BASE_RESERVE {
                    return Err(Error::InvalidOperation(format!(
                        "create-account amount {} below base reserve {}",
                        op.amount, BASE_RESERVE
                    )));
                }
            }
            Self::Payment(op) => {
                if op.amount.is_zero() {
                    return Err(Error::InvalidOperation("zero payment amount".into()));
                }
            }
            // Zero amounts are legal here: an empty block collects no fees,
            // and inflation is zero past the end height.
            Self::CollectTxFee(op) => {
                if op.block_hash.is_empty() {
                    return Err(Error::BadForm("collect-tx-fee without block hash".into()));
                }
            }
            Self::Inflation(op) => {
                if op.block_hash.is_empty() {
                    return Err(Error::BadForm("inflation without block hash".into()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::CreateAccount(_) => "CreateAccount",
            Self::Payment(_) => "Payment",
            Self::CollectTxFee(_) => "CollectTxFee",
            Self::Inflation(_) => "Inflation",
        };
        write!(f, "{}(target={}, amount={})", kind, self.target(), self.amount())
    }
}
