//! # Storage Module
//!
//! Persistence for blocks, transactions, operations, and accounts.
//!
//! ```text
//! block.rs   — Block record, genesis construction, content hashing
//! account.rs — BlockAccount: balance and sequence id per address
//! db.rs      — sled persistence with the protocol's fixed key scheme
//! ```
//!
//! On-disk values are the same canonical JSON as the wire. The key scheme
//! is bit-exact for cross-implementation compatibility — see [`db`] for
//! the layout.

pub mod account;
pub mod block;
pub mod db;

pub use account::BlockAccount;
pub use block::Block;
pub use db::Storage;
