// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ISAAC Protocol — Core Library
//!
//! The core of a Byzantine-fault-tolerant blockchain node: the ISAAC
//! consensus state machine and the ballot-processing pipeline that drive
//! agreement on an ordered block sequence among a fixed validator set.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! validator:
//!
//! - **crypto** — Ed25519 keypairs, base58 addresses, SHA-256 hashing.
//! - **voting** — ballot states, the tri-state voting hole, voting bases.
//! - **ballot** — the signed message validators exchange, including the
//!   proposer's fee-and-inflation transaction.
//! - **transaction** — user transactions and their operations.
//! - **consensus** — the ISAAC core, checker pipeline, state manager,
//!   and finalizer.
//! - **network** — capability traits at the transport seam, the bounded
//!   intake queue, and the transaction pool.
//! - **storage** — sled persistence with a fixed key scheme.
//! - **config** — protocol constants and node configuration.
//! - **observer** — metrics observer trait the node binary implements.
//!
//! ## Concurrency model
//!
//! Network workers validate nothing and decide nothing: they enqueue raw
//! ballots into a bounded queue. One task — the state manager — owns all
//! consensus state and serializes every mutation. The transaction pool is
//! the only structure shared across paths, and it is atomic on its own.
//!
//! ## Design rules
//!
//! 1. Consensus code never panics on input; every failure is a typed
//!    error with an explicit propagation class.
//! 2. Money arithmetic is checked. Overflow is an error, not a wrap.
//! 3. If it touches a tally or a balance, it has tests.

pub mod ballot;
pub mod common;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod network;
pub mod observer;
pub mod storage;
pub mod transaction;
pub mod voting;

pub use error::{Error, Result};
