//! Cryptographic primitives: Ed25519 keypairs with base58 addresses, and
//! SHA-256 object hashing with base58 digests.

pub mod hash;
pub mod keys;

pub use hash::{object_hash, sha256, sha256_array, signing_payload};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
