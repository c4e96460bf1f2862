//! # Transaction Pool
//!
//! Thread-safe pool of well-formed user transactions awaiting block
//! inclusion. The network path adds, the consensus core drains on propose
//! and removes on finalize — all operations are atomic under one lock,
//! and a snapshot taken for a proposal is a consistent view.
//!
//! Insertion order is preserved so that draining for a proposal is
//! deterministic: first come, first proposed. When the pool is at
//! capacity new transactions are rejected; pending user transactions are
//! never silently evicted.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::transaction::Transaction;

struct PoolInner {
    txs: HashMap<String, Transaction>,
    order: VecDeque<String>,
}

/// A bounded, insertion-ordered transaction pool.
pub struct TransactionPool {
    inner: RwLock<PoolInner>,
    capacity: usize,
}

impl TransactionPool {
    /// Creates a pool holding at most `capacity` transactions.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(PoolInner {
                txs: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    /// Inserts a transaction.
    ///
    /// Re-adding a known hash is a no-op (gossip delivers duplicates); a
    /// full pool rejects with [`Error::PoolFull`].
    pub fn add(&self, tx: Transaction) -> Result<()> {
        let mut inner = self.inner.write();
        let hash = tx.hash().to_string();
        if inner.txs.contains_key(&hash) {
            return Ok(());
        }
        if inner.txs.len() >= self.capacity {
            return Err(Error::PoolFull);
        }
        inner.order.push_back(hash.clone());
        inner.txs.insert(hash, tx);
        Ok(())
    }

    /// Removes the given hashes, typically after block finalization.
    pub fn remove(&self, hashes: &[String]) {
        let mut inner = self.inner.write();
        for hash in hashes {
            inner.txs.remove(hash);
        }
        let PoolInner { order, txs } = &mut *inner;
        order.retain(|h| txs.contains_key(h));
    }

    /// Returns the transaction for a hash, if pooled.
    pub fn get(&self, hash: &str) -> Option<Transaction> {
        self.inner.read().txs.get(hash).cloned()
    }

    /// Returns the pooled transactions for the given hashes, in the given
    /// order, with `None` holes for anything missing.
    pub fn get_all(&self, hashes: &[String]) -> Vec<Option<Transaction>> {
        let inner = self.inner.read();
        hashes.iter().map(|h| inner.txs.get(h).cloned()).collect()
    }

    /// `true` if the pool holds the hash.
    pub fn contains(&self, hash: &str) -> bool {
        self.inner.read().txs.contains_key(hash)
    }

    /// A consistent snapshot of up to `txs_limit` transactions in
    /// insertion order, additionally capped at `ops_limit` total
    /// operations. Used by the proposer to assemble a proposal.
    pub fn availables(&self, txs_limit: usize, ops_limit: usize) -> Vec<Transaction> {
        let inner = self.inner.read();
        let mut picked = Vec::new();
        let mut ops = 0usize;
        for hash in inner.order.iter() {
            if picked.len() >= txs_limit {
                break;
            }
            let Some(tx) = inner.txs.get(hash) else {
                continue;
            };
            let tx_ops = tx.b.operations.len();
            if ops + tx_ops > ops_limit {
                break;
            }
            ops += tx_ops;
            picked.push(tx.clone());
        }
        picked
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.inner.read().txs.len()
    }

    /// `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.inner.read().txs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Amount;
    use crate::crypto::keys::Keypair;
    use crate::transaction::{Operation, Payment};

    fn tx_with_ops(ops: usize) -> Transaction {
        let kp = Keypair::generate();
        let operations = (0..ops)
            .map(|i| {
                Operation::Payment(Payment {
                    target: Keypair::generate().address(),
                    amount: Amount::new(100 + i as u64),
                })
            })
            .collect();
        let mut tx = Transaction::new(kp.address(), 0, operations).unwrap();
        tx.sign(&kp, b"test-net");
        tx
    }

    #[test]
    fn add_get_remove() {
        let pool = TransactionPool::new(10);
        let tx = tx_with_ops(1);
        let hash = tx.hash().to_string();

        pool.add(tx.clone()).unwrap();
        assert!(pool.contains(&hash));
        assert_eq!(pool.get(&hash).unwrap(), tx);
        assert_eq!(pool.len(), 1);

        pool.remove(&[hash.clone()]);
        assert!(!pool.contains(&hash));
        assert!(pool.is_empty());
    }

    #[test]
    fn duplicate_add_is_noop() {
        let pool = TransactionPool::new(10);
        let tx = tx_with_ops(1);
        pool.add(tx.clone()).unwrap();
        pool.add(tx).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn full_pool_rejects() {
        let pool = TransactionPool::new(2);
        pool.add(tx_with_ops(1)).unwrap();
        pool.add(tx_with_ops(1)).unwrap();
        assert!(matches!(pool.add(tx_with_ops(1)), Err(Error::PoolFull)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn availables_respects_insertion_order_and_limits() {
        let pool = TransactionPool::new(10);
        let txs: Vec<Transaction> = (0..5).map(|_| tx_with_ops(1)).collect();
        for tx in &txs {
            pool.add(tx.clone()).unwrap();
        }

        let picked = pool.availables(3, 100);
        assert_eq!(picked.len(), 3);
        for (picked_tx, tx) in picked.iter().zip(&txs) {
            assert_eq!(picked_tx.hash(), tx.hash());
        }
    }

    #[test]
    fn availables_respects_ops_limit() {
        let pool = TransactionPool::new(10);
        pool.add(tx_with_ops(3)).unwrap();
        pool.add(tx_with_ops(3)).unwrap();
        pool.add(tx_with_ops(3)).unwrap();

        // Limit of 7 operations fits two three-op transactions, not three.
        let picked = pool.availables(10, 7);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn get_all_reports_missing_as_none() {
        let pool = TransactionPool::new(10);
        let tx = tx_with_ops(1);
        let hash = tx.hash().to_string();
        pool.add(tx).unwrap();

        let found = pool.get_all(&[hash, "absent".to_string()]);
        assert!(found[0].is_some());
        assert!(found[1].is_none());
    }

    #[test]
    fn remove_keeps_order_of_survivors() {
        let pool = TransactionPool::new(10);
        let txs: Vec<Transaction> = (0..4).map(|_| tx_with_ops(1)).collect();
        for tx in &txs {
            pool.add(tx.clone()).unwrap();
        }

        pool.remove(&[txs[1].hash().to_string()]);
        let picked = pool.availables(10, 100);
        let hashes: Vec<&str> = picked.iter().map(|t| t.hash()).collect();
        assert_eq!(hashes, vec![txs[0].hash(), txs[2].hash(), txs[3].hash()]);
    }
}
