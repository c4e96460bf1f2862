//! # Protocol Errors
//!
//! Every failure mode of the consensus core lives in one enum. The variants
//! fall into three propagation classes:
//!
//! - **Drop and count** — `BadForm`, `BadSignature`, `StaleBasis`,
//!   `FutureBasis`. The offending ballot is discarded, the observer is told,
//!   and nothing else happens. No peer is penalized beyond a log line.
//! - **Vote NO** — `InvalidProposerTransaction`, `MissingTransaction`. The
//!   ballot is structurally fine but semantically wrong, so the local node
//!   keeps the protocol live by voting NO on that slot.
//! - **Fatal** — `ApplyFailure`. A quorum approved a block that storage
//!   refuses to apply. That is a safety violation and the node must stop;
//!   this variant is never swallowed.

use crate::voting::Basis;

/// Convenience alias used throughout the protocol crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors produced by the protocol crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structural or schema failure in a ballot, transaction, or operation.
    #[error("malformed message: {0}")]
    BadForm(String),

    /// Cryptographic signature verification failed.
    #[error("signature verification failed")]
    BadSignature,

    /// Ballot basis is older than the locally tracked `(height, round)`.
    #[error("stale basis: ballot {ballot}, local height {local_height} round {local_round}")]
    StaleBasis {
        ballot: Basis,
        local_height: u64,
        local_round: u32,
    },

    /// Ballot basis is ahead of the local chain; the node is behind.
    #[error("future basis: ballot height {ballot_height}, local height {local_height}")]
    FutureBasis {
        ballot_height: u64,
        local_height: u64,
    },

    /// The proposer transaction is structurally valid but semantically wrong.
    #[error("invalid proposer transaction: {0}")]
    InvalidProposerTransaction(String),

    /// The proposer transaction carries a non-zero fee.
    #[error("proposer transaction fee must be zero")]
    InvalidFee,

    /// Two operations in one transaction share a canonical hash.
    #[error("duplicated operation in transaction")]
    DuplicatedOperation,

    /// An operation failed semantic validation against the referenced block.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A transaction referenced by a ballot is not in the pool and could not
    /// be fetched from peers within the retry budget.
    #[error("missing transaction: {0}")]
    MissingTransaction(String),

    /// Storage rejected an operation of a quorum-approved block. Fatal.
    #[error("apply failure (safety violation): {0}")]
    ApplyFailure(String),

    /// Checked amount arithmetic overflowed or underflowed.
    #[error("amount overflow")]
    AmountOverflow,

    /// An account balance would go negative.
    #[error("insufficient balance on {address}")]
    InsufficientBalance { address: String },

    /// The transaction pool is at capacity.
    #[error("transaction pool is full")]
    PoolFull,

    /// Underlying sled error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Value (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Key material was malformed (wrong length, not a curve point, bad
    /// base58).
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
