//! # Transactions
//!
//! A transaction is a signed envelope of operations from one source
//! account. The envelope mirrors the ballot wire shape: a header `H`
//! carrying the content hash and signature, and a body `B` carrying the
//! signed fields in canonical order.
//!
//! The fee is paid by the source on top of the moved amounts, at
//! [`BASE_FEE`](crate::config::BASE_FEE) per operation. The sequence id
//! must match the source account's stored sequence id at apply time, which
//! makes replays of an already-applied transaction unappliable.

pub mod operation;

pub use operation::{CollectTxFee, CreateAccount, Inflation, Operation, Payment};

use serde::{Deserialize, Serialize};

use crate::common::Amount;
use crate::config::{Config, BASE_FEE, DEFAULT_OPS_IN_TX_LIMIT};
use crate::crypto::hash::{object_hash, signing_payload};
use crate::crypto::keys::{Keypair, PublicKey, Signature};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// Header of a signed transaction: content hash plus signature, both
/// base58 strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionHeader {
    /// base58(SHA-256(canonical JSON of the body)).
    pub hash: String,
    /// base58 Ed25519 signature over `network_id || canonical body`.
    pub signature: String,
}

/// Signed fields of a transaction, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    /// Source account address; pays the fee and all debits.
    pub source: String,
    /// Total fee, at least `BASE_FEE` per operation.
    pub fee: Amount,
    /// Must equal the source account's sequence id at apply time.
    pub sequence_id: u64,
    /// Ordered, non-empty list of operations.
    pub operations: Vec<Operation>,
}

/// A signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "H")]
    pub h: TransactionHeader,
    #[serde(rename = "B")]
    pub b: TransactionBody,
}

impl Transaction {
    /// Builds an unsigned transaction with the default fee for its
    /// operation count. Call [`Transaction::sign`] before use.
    pub fn new(source: String, sequence_id: u64, operations: Vec<Operation>) -> Result<Self> {
        let fee = BASE_FEE.checked_mul(operations.len() as u64)?;
        Ok(Self {
            h: TransactionHeader::default(),
            b: TransactionBody {
                source,
                fee,
                sequence_id,
                operations,
            },
        })
    }

    /// Computes the body hash and signs `network_id || body`.
    pub fn sign(&mut self, keypair: &Keypair, network_id: &[u8]) {
        self.h.hash = object_hash(&self.b);
        let payload = signing_payload(network_id, &self.b);
        self.h.signature = keypair.sign(&payload).to_base58();
    }

    /// The content hash identifying this transaction.
    pub fn hash(&self) -> &str {
        &self.h.hash
    }

    /// The source account address.
    pub fn source(&self) -> &str {
        &self.b.source
    }

    /// The total fee the source pays for this transaction.
    pub fn fee(&self) -> Amount {
        self.b.fee
    }

    /// Sum of all operation amounts (excluding the fee).
    pub fn total_amount(&self) -> Result<Amount> {
        Amount::checked_sum(self.b.operations.iter().map(|op| op.amount()))
    }

    /// Verifies the stored hash and the source's signature.
    pub fn verify(&self, network_id: &[u8]) -> Result<()> {
        if self.h.hash != object_hash(&self.b) {
            return Err(Error::BadForm("transaction hash mismatch".into()));
        }
        let source = PublicKey::from_address(&self.b.source)
            .map_err(|_| Error::BadForm(format!("invalid source address: {}", self.b.source)))?;
        let signature =
            Signature::from_base58(&self.h.signature).map_err(|_| Error::BadSignature)?;
        let payload = signing_payload(network_id, &self.b);
        if !source.verify(&payload, &signature) {
            return Err(Error::BadSignature);
        }
        Ok(())
    }

    /// Structural validation of a user transaction.
    ///
    /// Proposer-only operations are rejected here; they may only appear
    /// inside a proposer transaction, which has its own rules.
    pub fn is_well_formed(&self, config: &Config) -> Result<()> {
        if self.b.operations.is_empty() {
            return Err(Error::BadForm("transaction without operations".into()));
        }
        if self.b.operations.len() > DEFAULT_OPS_IN_TX_LIMIT {
            return Err(Error::BadForm(format!(
                "too many operations: {}",
                self.b.operations.len()
            )));
        }
        PublicKey::from_address(&self.b.source)
            .map_err(|_| Error::BadForm(format!("invalid source address: {}", self.b.source)))?;

        let min_fee = BASE_FEE.checked_mul(self.b.operations.len() as u64)?;
        if self.b.fee < min_fee {
            return Err(Error::BadForm(format!(
                "fee {} below minimum {}",
                self.b.fee, min_fee
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for op in &self.b.operations {
            if op.is_proposer_only() {
                return Err(Error::BadForm(
                    "proposer-only operation in user transaction".into(),
                ));
            }
            op.is_well_formed(config)?;
            if !seen.insert(op.hash()) {
                return Err(Error::DuplicatedOperation);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BASE_RESERVE;

    fn payment_to(target: String, amount: u64) -> Operation {
        Operation::Payment(Payment {
            target,
            amount: Amount::new(amount),
        })
    }

    fn signed_tx(kp: &Keypair, ops: Vec<Operation>) -> Transaction {
        let mut tx = Transaction::new(kp.address(), 0, ops).unwrap();
        tx.sign(kp, b"test-net");
        tx
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = Keypair::generate();
        let dest = Keypair::generate().address();
        let tx = signed_tx(&kp, vec![payment_to(dest, 100)]);

        assert!(tx.verify(b"test-net").is_ok());
        assert!(!tx.hash().is_empty());
    }

    #[test]
    fn verify_fails_under_other_network() {
        let kp = Keypair::generate();
        let dest = Keypair::generate().address();
        let tx = signed_tx(&kp, vec![payment_to(dest, 100)]);

        assert!(matches!(tx.verify(b"other-net"), Err(Error::BadSignature)));
    }

    #[test]
    fn verify_detects_body_tampering() {
        let kp = Keypair::generate();
        let dest = Keypair::generate().address();
        let mut tx = signed_tx(&kp, vec![payment_to(dest, 100)]);

        tx.b.fee = Amount::new(0);
        assert!(tx.verify(b"test-net").is_err());
    }

    #[test]
    fn serde_roundtrip_preserves_signature() {
        let kp = Keypair::generate();
        let dest = Keypair::generate().address();
        let tx = signed_tx(&kp, vec![payment_to(dest, 100)]);

        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
        assert!(back.verify(b"test-net").is_ok());
    }

    #[test]
    fn default_fee_scales_with_operations() {
        let kp = Keypair::generate();
        let a = Keypair::generate().address();
        let b = Keypair::generate().address();
        let tx = signed_tx(&kp, vec![payment_to(a, 1), payment_to(b, 2)]);

        assert_eq!(tx.fee(), BASE_FEE.checked_mul(2).unwrap());
        assert!(tx.is_well_formed(&Config::default()).is_ok());
    }

    #[test]
    fn empty_transaction_rejected() {
        let kp = Keypair::generate();
        let tx = signed_tx(&kp, vec![]);
        assert!(matches!(
            tx.is_well_formed(&Config::default()),
            Err(Error::BadForm(_))
        ));
    }

    #[test]
    fn underpaid_fee_rejected() {
        let kp = Keypair::generate();
        let dest = Keypair::generate().address();
        let mut tx = Transaction::new(kp.address(), 0, vec![payment_to(dest, 5)]).unwrap();
        tx.b.fee = Amount::new(1);
        tx.sign(&kp, b"test-net");

        assert!(tx.is_well_formed(&Config::default()).is_err());
    }

    #[test]
    fn proposer_only_operation_rejected_in_user_tx() {
        let kp = Keypair::generate();
        let tx = signed_tx(
            &kp,
            vec![Operation::Inflation(Inflation {
                target: Keypair::generate().address(),
                amount: Amount::ZERO,
                height: 1,
                block_hash: "h".into(),
                total_txs: 0,
            })],
        );
        assert!(tx.is_well_formed(&Config::default()).is_err());
    }

    #[test]
    fn duplicated_operation_rejected() {
        let kp = Keypair::generate();
        let dest = Keypair::generate().address();
        let op = payment_to(dest, 100);
        let mut tx = Transaction::new(kp.address(), 0, vec![op.clone(), op]).unwrap();
        tx.sign(&kp, b"test-net");

        assert!(matches!(
            tx.is_well_formed(&Config::default()),
            Err(Error::DuplicatedOperation)
        ));
    }

    #[test]
    fn total_amount_sums_operations() {
        let kp = Keypair::generate();
        let a = Keypair::generate().address();
        let tx = signed_tx(
            &kp,
            vec![
                payment_to(a, 100),
                Operation::CreateAccount(CreateAccount {
                    target: Keypair::generate().address(),
                    amount: BASE_RESERVE,
                }),
            ],
        );
        assert_eq!(
            tx.total_amount().unwrap(),
            Amount::new(100).checked_add(BASE_RESERVE).unwrap()
        );
    }
}
