//! # Hashing Utilities
//!
//! SHA-256 is the one and only consensus hash. Ballot hashes, transaction
//! hashes, and block hashes are all the base58 encoding of the SHA-256
//! digest of the object's canonical JSON serialization.
//!
//! "Canonical" here means: serde serialization of the struct with fields in
//! declaration order. `serde_json` writes struct fields in that order, so
//! two nodes with the same struct definitions always produce the same bytes.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// Returns a 32-byte digest as a `Vec<u8>`. For a fixed-size result use
/// [`sha256_array`].
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Compute the SHA-256 hash and return a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash a serializable object: base58(SHA-256(canonical JSON)).
///
/// This is how every content identifier on the network is derived. The
/// serialization of the protocol's own types cannot fail; if it ever does,
/// the digest of the error string is returned so that consensus code stays
/// panic-free.
pub fn object_hash<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_else(|e| e.to_string().into_bytes());
    bs58::encode(sha256_array(&bytes)).into_string()
}

/// Canonical signing payload: `network_id || canonical JSON(value)`.
///
/// Mixing the network identifier into every signature prevents replaying
/// testnet messages on mainnet and vice versa.
pub fn signing_payload<T: Serialize>(network_id: &[u8], value: &T) -> Vec<u8> {
    let mut payload = network_id.to_vec();
    payload.extend(serde_json::to_vec(value).unwrap_or_else(|e| e.to_string().into_bytes()));
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Probe {
        a: u64,
        b: String,
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256_array(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn object_hash_is_deterministic() {
        let p1 = Probe { a: 7, b: "x".into() };
        let p2 = Probe { a: 7, b: "x".into() };
        assert_eq!(object_hash(&p1), object_hash(&p2));
    }

    #[test]
    fn object_hash_differs_on_content() {
        let p1 = Probe { a: 7, b: "x".into() };
        let p2 = Probe { a: 8, b: "x".into() };
        assert_ne!(object_hash(&p1), object_hash(&p2));
    }

    #[test]
    fn signing_payload_prefixes_network_id() {
        let p = Probe { a: 1, b: "y".into() };
        let main = signing_payload(b"main", &p);
        let test = signing_payload(b"test", &p);
        assert_ne!(main, test);
        assert!(main.starts_with(b"main"));
    }
}
