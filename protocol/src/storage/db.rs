//! # Storage — Persistent Key-Value Engine
//!
//! sled-backed persistence with a fixed, bit-exact key scheme:
//!
//! | Key                                          | Value                |
//! |----------------------------------------------|----------------------|
//! | `block:hash:<b58hash>`                       | `json(Block)`        |
//! | `block:height:<u64 BE>`                      | block hash (UTF-8)   |
//! | `blocktx:<blockhash>:<i BE>`                 | tx hash (UTF-8)      |
//! | `tx:<txhash>`                                | `json(Transaction)`  |
//! | `blockop:<height BE>:<txhash>:<opindex BE>`  | `json(Operation)`    |
//! | `account:<address>`                          | `json(BlockAccount)` |
//! | `meta:latest_height`                         | height (8B BE)       |
//!
//! Numeric key components are big-endian so sled's lexicographic ordering
//! matches numeric ordering and prefix scans return rows in index order.
//! Values are the same canonical JSON as the wire: the operation enum is
//! tagged by a `type` field, which requires a self-describing format to
//! round-trip.
//!
//! ## Atomicity
//!
//! A finalized block, its transactions, operations, and account updates
//! land in one `sled::Batch`. Either the whole block commits or none of it
//! does.

use sled::Batch;
use std::path::Path;

use crate::common::Amount;
use crate::error::{Error, Result};
use crate::storage::account::BlockAccount;
use crate::storage::block::Block;
use crate::transaction::{Operation, Transaction};

/// Well-known metadata key for the latest committed height.
const META_LATEST_HEIGHT: &[u8] = b"meta:latest_height";

// ---------------------------------------------------------------------------
// Key builders
// ---------------------------------------------------------------------------

/// `block:hash:<b58hash>`
pub fn block_hash_key(hash: &str) -> Vec<u8> {
    let mut key = b"block:hash:".to_vec();
    key.extend(hash.as_bytes());
    key
}

/// `block:height:<u64 BE>`
pub fn block_height_key(height: u64) -> Vec<u8> {
    let mut key = b"block:height:".to_vec();
    key.extend(height.to_be_bytes());
    key
}

/// `blocktx:<blockhash>:<i BE>`
pub fn block_tx_key(block_hash: &str, index: u64) -> Vec<u8> {
    let mut key = b"blocktx:".to_vec();
    key.extend(block_hash.as_bytes());
    key.push(b':');
    key.extend(index.to_be_bytes());
    key
}

/// `tx:<txhash>`
pub fn tx_key(tx_hash: &str) -> Vec<u8> {
    let mut key = b"tx:".to_vec();
    key.extend(tx_hash.as_bytes());
    key
}

/// `blockop:<blockheight BE>:<txhash>:<opindex BE>`
pub fn block_op_key(height: u64, tx_hash: &str, op_index: u64) -> Vec<u8> {
    let mut key = b"blockop:".to_vec();
    key.extend(height.to_be_bytes());
    key.push(b':');
    key.extend(tx_hash.as_bytes());
    key.push(b':');
    key.extend(op_index.to_be_bytes());
    key
}

/// `account:<address>`
pub fn account_key(address: &str) -> Vec<u8> {
    let mut key = b"account:".to_vec();
    key.extend(address.as_bytes());
    key
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Persistent storage engine for the chain.
///
/// sled is inherently thread-safe; `Storage` can be shared across tasks
/// via `Arc<Storage>` without external synchronization. All writes of a
/// finalized block go through [`Storage::commit_block`] in one batch.
#[derive(Debug, Clone)]
pub struct Storage {
    db: sled::Db,
}

impl Storage {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Create a temporary database cleaned up on drop. Ideal for tests.
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Initializes an empty database with the genesis block and the two
    /// bootstrap accounts: the genesis account holding the initial balance
    /// and the zero-balance common account.
    ///
    /// Idempotent — an already initialized database is left untouched and
    /// its latest block is returned.
    pub fn bootstrap(
        &self,
        genesis_account_address: &str,
        initial_balance: Amount,
        common_account_address: &str,
    ) -> Result<Block> {
        if let Some(latest) = self.latest_height()? {
            return self
                .get_block_by_height(latest)?
                .ok_or_else(|| Error::Serialization("latest height without block".into()));
        }

        let genesis = Block::genesis();
        let mut batch = Batch::default();
        batch.insert(block_hash_key(&genesis.hash), serde_json::to_vec(&genesis)?);
        batch.insert(
            block_height_key(genesis.height),
            genesis.hash.as_bytes().to_vec(),
        );
        batch.insert(META_LATEST_HEIGHT, &genesis.height.to_be_bytes());

        let genesis_account =
            BlockAccount::new(genesis_account_address.to_string(), initial_balance);
        batch.insert(
            account_key(genesis_account_address),
            serde_json::to_vec(&genesis_account)?,
        );
        let common_account = BlockAccount::new(common_account_address.to_string(), Amount::ZERO);
        batch.insert(
            account_key(common_account_address),
            serde_json::to_vec(&common_account)?,
        );

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(genesis)
    }

    // -- Blocks -------------------------------------------------------------

    /// The latest committed height, if any block has been committed.
    pub fn latest_height(&self) -> Result<Option<u64>> {
        match self.db.get(META_LATEST_HEIGHT)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::Serialization("invalid height bytes".into()))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// The latest committed block. Errors if the database is empty.
    pub fn latest_block(&self) -> Result<Block> {
        let height = self
            .latest_height()?
            .ok_or_else(|| Error::Serialization("storage not bootstrapped".into()))?;
        self.get_block_by_height(height)?
            .ok_or_else(|| Error::Serialization("latest height without block".into()))
    }

    /// Retrieve a block by its hash.
    pub fn get_block_by_hash(&self, hash: &str) -> Result<Option<Block>> {
        match self.db.get(block_hash_key(hash))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve a block by height via the height index.
    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        match self.db.get(block_height_key(height))? {
            Some(hash_bytes) => {
                let hash = String::from_utf8(hash_bytes.to_vec())
                    .map_err(|_| Error::Serialization("invalid block hash bytes".into()))?;
                self.get_block_by_hash(&hash)
            }
            None => Ok(None),
        }
    }

    // -- Transactions and operations ----------------------------------------

    /// Retrieve a stored transaction by hash.
    pub fn get_transaction(&self, tx_hash: &str) -> Result<Option<Transaction>> {
        match self.db.get(tx_key(tx_hash))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The ordered user transaction hashes of a block, from the
    /// `blocktx:` index.
    pub fn block_transactions(&self, block_hash: &str) -> Result<Vec<String>> {
        let mut prefix = b"blocktx:".to_vec();
        prefix.extend(block_hash.as_bytes());
        prefix.push(b':');

        let mut hashes = Vec::new();
        for entry in self.db.scan_prefix(&prefix) {
            let (_key, value) = entry?;
            let hash = String::from_utf8(value.to_vec())
                .map_err(|_| Error::Serialization("invalid tx hash bytes".into()))?;
            hashes.push(hash);
        }
        Ok(hashes)
    }

    /// The ordered operations of one transaction within a block, from the
    /// `blockop:` index.
    pub fn block_operations(&self, height: u64, tx_hash: &str) -> Result<Vec<Operation>> {
        let mut prefix = b"blockop:".to_vec();
        prefix.extend(height.to_be_bytes());
        prefix.push(b':');
        prefix.extend(tx_hash.as_bytes());
        prefix.push(b':');

        let mut operations = Vec::new();
        for entry in self.db.scan_prefix(&prefix) {
            let (_key, value) = entry?;
            operations.push(serde_json::from_slice(&value)?);
        }
        Ok(operations)
    }

    // -- Accounts -----------------------------------------------------------

    /// Retrieve an account record.
    pub fn get_account(&self, address: &str) -> Result<Option<BlockAccount>> {
        match self.db.get(account_key(address))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist a single account record outside a block commit. Used by
    /// bootstrap paths and tests; finalization goes through
    /// [`Storage::commit_block`].
    pub fn put_account(&self, account: &BlockAccount) -> Result<()> {
        self.db
            .insert(account_key(&account.address), serde_json::to_vec(account)?)?;
        Ok(())
    }

    // -- Block commit -------------------------------------------------------

    /// Atomically persists a finalized block with all derived records.
    ///
    /// `transactions` must contain every transaction the block references,
    /// the proposer transaction included; `accounts` carries the
    /// post-application state of every touched account. Everything lands
    /// in one batch and is flushed before returning.
    pub fn commit_block(
        &self,
        block: &Block,
        transactions: &[Transaction],
        accounts: &[BlockAccount],
    ) -> Result<()> {
        let mut batch = Batch::default();

        batch.insert(block_hash_key(&block.hash), serde_json::to_vec(block)?);
        batch.insert(
            block_height_key(block.height),
            block.hash.as_bytes().to_vec(),
        );

        for (i, tx_hash) in block.transactions.iter().enumerate() {
            batch.insert(
                block_tx_key(&block.hash, i as u64),
                tx_hash.as_bytes().to_vec(),
            );
        }

        for tx in transactions {
            batch.insert(tx_key(tx.hash()), serde_json::to_vec(tx)?);
            for (i, op) in tx.b.operations.iter().enumerate() {
                batch.insert(
                    block_op_key(block.height, tx.hash(), i as u64),
                    serde_json::to_vec(op)?,
                );
            }
        }

        for account in accounts {
            batch.insert(account_key(&account.address), serde_json::to_vec(account)?);
        }

        batch.insert(META_LATEST_HEIGHT, &block.height.to_be_bytes());

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }
}
