//! # Protocol Configuration & Constants
//!
//! Every magic number of the protocol lives here, together with the
//! runtime [`Config`] that a node is started with. The constants define
//! the economics and timing of the network; changing them after launch is
//! a coordinated hard fork.

use std::time::Duration;

use crate::common::Amount;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Default network identifier mixed into every signature.
///
/// Each deployment picks its own value; signatures made under one network
/// identifier never verify under another.
pub const DEFAULT_NETWORK_ID: &[u8] = b"isaac-main-net";

// ---------------------------------------------------------------------------
// Economics
// ---------------------------------------------------------------------------

/// Fee charged per operation in a user transaction, in base units.
pub const BASE_FEE: Amount = Amount::new(10_000);

/// Minimum balance required to create a new account, in base units.
pub const BASE_RESERVE: Amount = Amount::new(1_000_000);

/// Total initial supply credited to the genesis account, in base units.
pub const TOTAL_INITIAL_BALANCE: Amount = Amount::new(10_000_000_000_000_000);

/// Inflation ratio denominator. The per-block inflation amount is
/// `initial_balance / INFLATION_RATIO_DENOM`, i.e. a ratio of 0.0000001.
pub const INFLATION_RATIO_DENOM: u64 = 10_000_000;

/// Block height after which the per-block inflation amount becomes zero.
pub const DEFAULT_BLOCK_HEIGHT_END_OF_INFLATION: u64 = 36_000_000;

// ---------------------------------------------------------------------------
// Throughput Caps
// ---------------------------------------------------------------------------

/// Maximum number of user transactions a proposer may include in one block.
pub const DEFAULT_TXS_LIMIT: usize = 1_000;

/// Maximum number of operations across all transactions in one block.
pub const DEFAULT_OPS_LIMIT: usize = 10_000;

/// Maximum number of operations in a single user transaction.
pub const DEFAULT_OPS_IN_TX_LIMIT: usize = 100;

/// Default capacity of the pending transaction pool.
pub const DEFAULT_POOL_CAPACITY: usize = 100_000;

/// Default capacity of the inbound ballot queue.
pub const DEFAULT_BALLOT_QUEUE_CAPACITY: usize = 1_024;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Default per-phase timeouts before the local node votes EXPIRED.
pub const DEFAULT_TIMEOUT_INIT: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT_SIGN: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT_ACCEPT: Duration = Duration::from_secs(2);

/// Retry budget for pulling a missing transaction from peers before the
/// local node gives up and votes NO on the slot.
pub const DEFAULT_TX_FETCH_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Runtime configuration of a validator node.
///
/// The validator set is fixed for the lifetime of the process; membership
/// changes are out of scope for the protocol and require a restart.
#[derive(Debug, Clone)]
pub struct Config {
    /// Network identifier bytes, mixed into every signature.
    pub network_id: Vec<u8>,

    /// Addresses of all validators, including the local node.
    pub validators: Vec<String>,

    /// Address of the common account receiving fees and inflation.
    pub common_account_address: String,

    /// Initial balance used by the inflation formula.
    pub initial_balance: Amount,

    /// Per-block cap on included user transactions.
    pub txs_limit: usize,

    /// Per-block cap on operations across all included transactions.
    pub ops_limit: usize,

    /// Phase deadlines. Independent per phase.
    pub timeout_init: Duration,
    pub timeout_sign: Duration,
    pub timeout_accept: Duration,

    /// Height after which the inflation amount is zero.
    pub block_height_end_of_inflation: u64,

    /// Explicit quorum override. `None` selects the classical BFT quorum
    /// `2n/3 + 1` over the validator set size.
    pub threshold_override: Option<usize>,

    /// Retry budget for fetching missing transactions from peers.
    pub tx_fetch_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_id: DEFAULT_NETWORK_ID.to_vec(),
            validators: Vec::new(),
            common_account_address: String::new(),
            initial_balance: TOTAL_INITIAL_BALANCE,
            txs_limit: DEFAULT_TXS_LIMIT,
            ops_limit: DEFAULT_OPS_LIMIT,
            timeout_init: DEFAULT_TIMEOUT_INIT,
            timeout_sign: DEFAULT_TIMEOUT_SIGN,
            timeout_accept: DEFAULT_TIMEOUT_ACCEPT,
            block_height_end_of_inflation: DEFAULT_BLOCK_HEIGHT_END_OF_INFLATION,
            threshold_override: None,
            tx_fetch_retries: DEFAULT_TX_FETCH_RETRIES,
        }
    }
}

impl Config {
    /// The quorum threshold for the configured validator set.
    ///
    /// Defaults to `2n/3 + 1`, the classical BFT quorum for `n = 3f + 1`
    /// validators. An explicit override takes precedence.
    pub fn quorum(&self) -> usize {
        match self.threshold_override {
            Some(t) => t,
            None => quorum(self.validators.len()),
        }
    }

    /// The per-block inflation amount at the given height.
    ///
    /// `initial_balance / INFLATION_RATIO_DENOM` while the height is at or
    /// below [`Config::block_height_end_of_inflation`], zero afterwards.
    pub fn inflation_amount(&self, height: u64) -> Result<Amount> {
        if height > self.block_height_end_of_inflation {
            return Ok(Amount::ZERO);
        }
        calculate_inflation(self.initial_balance)
    }

    /// Returns `true` if `address` is a member of the validator set.
    pub fn is_validator(&self, address: &str) -> bool {
        self.validators.iter().any(|v| v == address)
    }
}

/// Classical BFT quorum: `2n/3 + 1` votes out of `n` validators.
pub fn quorum(validators: usize) -> usize {
    2 * validators / 3 + 1
}

/// The fixed per-block inflation amount derived from the initial balance.
pub fn calculate_inflation(initial_balance: Amount) -> Result<Amount> {
    Ok(Amount::new(initial_balance.value() / INFLATION_RATIO_DENOM))
}
