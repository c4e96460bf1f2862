//! # Finalizer
//!
//! Turns a quorum-approved ballot into a committed block. The ordered
//! operations of the new block are the proposer transaction's two
//! operations followed by the operations of every referenced transaction
//! in order. Application is all-or-nothing: balances are settled in
//! memory first, then the block and every derived record land in one
//! storage batch.
//!
//! An application error here is fatal by definition — a quorum approved a
//! block this node cannot apply, so the safety invariant is already gone.
//! The error is surfaced as [`Error::ApplyFailure`] and never swallowed.

use std::collections::HashMap;

use tracing::info;

use crate::ballot::Ballot;
use crate::common::Amount;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::network::{TransactionFetcher, TransactionPool};
use crate::observer::ConsensusObserver;
use crate::storage::{Block, BlockAccount, Storage};
use crate::transaction::{Operation, Transaction};

/// Applies an approved ballot to storage and returns the committed block.
pub async fn finalize(
    ballot: &Ballot,
    storage: &Storage,
    pool: &TransactionPool,
    fetcher: &dyn TransactionFetcher,
    config: &Config,
    observer: &dyn ConsensusObserver,
) -> Result<Block> {
    // 1. Resolve every referenced transaction; a hole that survives the
    //    retry budget aborts finalization.
    let transactions = resolve_transactions(ballot, pool, fetcher, config).await?;

    // 2. Compose the block: proposer operations first, then each
    //    transaction's operations in order.
    let operation_count = 2 + transactions
        .iter()
        .map(|tx| tx.b.operations.len() as u64)
        .sum::<u64>();
    let block = Block::from_ballot(ballot, operation_count);

    // 3. Settle balances in memory; any rejection is an ApplyFailure.
    let accounts = apply(ballot, &transactions, storage)?;

    // 4. Persist everything in one batch.
    let ptx = ballot.proposer_transaction();
    let mut all_transactions = vec![ptx.0.clone()];
    all_transactions.extend(transactions.iter().cloned());
    storage.commit_block(&block, &all_transactions, &accounts)?;

    // 5. Applied transactions leave the pool; the observer hears about it.
    let hashes: Vec<String> = transactions
        .iter()
        .map(|tx| tx.hash().to_string())
        .collect();
    pool.remove(&hashes);

    let fees = ptx.collect_tx_fee()?.amount;
    let inflation = ptx.inflation()?.amount;
    observer.block_finalized(
        block.height,
        transactions.len(),
        operation_count as usize,
        fees,
        inflation,
    );
    info!(
        height = block.height,
        hash = %block.hash,
        txs = transactions.len(),
        ops = operation_count,
        "block finalized"
    );

    Ok(block)
}

async fn resolve_transactions(
    ballot: &Ballot,
    pool: &TransactionPool,
    fetcher: &dyn TransactionFetcher,
    config: &Config,
) -> Result<Vec<Transaction>> {
    let hashes = ballot.transactions();
    let mut resolved = pool.get_all(hashes);

    for _attempt in 0..=config.tx_fetch_retries {
        let missing: Vec<String> = hashes
            .iter()
            .zip(&resolved)
            .filter(|(_, tx)| tx.is_none())
            .map(|(hash, _)| hash.clone())
            .collect();
        if missing.is_empty() {
            break;
        }
        if let Ok(fetched) = fetcher.fetch(&missing).await {
            for tx in fetched {
                if tx.verify(&config.network_id).is_ok() {
                    let _ = pool.add(tx);
                }
            }
            resolved = pool.get_all(hashes);
        }
    }

    let mut transactions = Vec::with_capacity(hashes.len());
    for (hash, tx) in hashes.iter().zip(resolved) {
        match tx {
            Some(tx) => transactions.push(tx),
            None => return Err(Error::MissingTransaction(hash.clone())),
        }
    }
    Ok(transactions)
}

/// In-memory working set of the accounts a block touches.
struct Ledger<'a> {
    storage: &'a Storage,
    accounts: HashMap<String, BlockAccount>,
}

impl<'a> Ledger<'a> {
    fn new(storage: &'a Storage) -> Self {
        Self {
            storage,
            accounts: HashMap::new(),
        }
    }

    fn load(&mut self, address: &str) -> Result<&mut BlockAccount> {
        if !self.accounts.contains_key(address) {
            let account = self
                .storage
                .get_account(address)?
                .ok_or_else(|| Error::ApplyFailure(format!("unknown account {}", address)))?;
            self.accounts.insert(address.to_string(), account);
        }
        self.accounts
            .get_mut(address)
            .ok_or_else(|| Error::ApplyFailure(format!("unknown account {}", address)))
    }

    fn create(&mut self, address: &str, balance: Amount) -> Result<()> {
        let exists_in_memory = self.accounts.contains_key(address);
        let exists_on_disk = self.storage.get_account(address)?.is_some();
        if exists_in_memory || exists_on_disk {
            return Err(Error::ApplyFailure(format!(
                "account {} already exists",
                address
            )));
        }
        self.accounts.insert(
            address.to_string(),
            BlockAccount::new(address.to_string(), balance),
        );
        Ok(())
    }

    fn into_accounts(self) -> Vec<BlockAccount> {
        self.accounts.into_values().collect()
    }
}

fn apply(
    ballot: &Ballot,
    transactions: &[Transaction],
    storage: &Storage,
) -> Result<Vec<BlockAccount>> {
    let mut ledger = Ledger::new(storage);
    let ptx = ballot.proposer_transaction();

    // Proposer operations first: fees and inflation into the common account.
    let collect = ptx.collect_tx_fee()?;
    let inflation = ptx.inflation()?;
    let common = ledger.load(&collect.target)?;
    common
        .credit(collect.amount)
        .map_err(|e| Error::ApplyFailure(e.to_string()))?;
    common
        .credit(inflation.amount)
        .map_err(|e| Error::ApplyFailure(e.to_string()))?;

    // Then every user transaction, in ballot order.
    for tx in transactions {
        let debit = tx
            .total_amount()
            .and_then(|amount| amount.checked_add(tx.fee()))
            .map_err(|e| Error::ApplyFailure(e.to_string()))?;

        let source = ledger.load(tx.source())?;
        if tx.b.sequence_id != source.sequence_id {
            return Err(Error::ApplyFailure(format!(
                "transaction {} sequence {} does not match account sequence {}",
                tx.hash(),
                tx.b.sequence_id,
                source.sequence_id
            )));
        }
        source
            .debit(debit)
            .map_err(|e| Error::ApplyFailure(e.to_string()))?;
        source.sequence_id += 1;

        for op in &tx.b.operations {
            match op {
                Operation::Payment(payment) => {
                    let target = ledger.load(&payment.target)?;
                    target
                        .credit(payment.amount)
                        .map_err(|e| Error::ApplyFailure(e.to_string()))?;
                }
                Operation::CreateAccount(create) => {
                    ledger.create(&create.target, create.amount)?;
                }
                Operation::CollectTxFee(_) | Operation::Inflation(_) => {
                    return Err(Error::ApplyFailure(
                        "proposer-only operation inside a user transaction".into(),
                    ));
                }
            }
        }
    }

    Ok(ledger.into_accounts())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::ProposerTransaction;
    use crate::crypto::keys::Keypair;
    use crate::network::NullFetcher;
    use crate::observer::NullObserver;
    use crate::transaction::Payment;
    use crate::voting::{BallotState, VotingHole};
    use parking_lot::Mutex;

    const NETWORK: &[u8] = b"test-net";

    struct Fixture {
        storage: Storage,
        pool: TransactionPool,
        config: Config,
        proposer: Keypair,
        genesis: Block,
    }

    impl Fixture {
        fn new() -> Self {
            let proposer = Keypair::generate();
            let common_account = Keypair::generate().address();
            let genesis_account = Keypair::generate().address();

            let config = Config {
                network_id: NETWORK.to_vec(),
                validators: vec![proposer.address()],
                common_account_address: common_account.clone(),
                initial_balance: Amount::new(10_000_000_000),
                ..Config::default()
            };

            let storage = Storage::open_temporary().unwrap();
            let genesis = storage
                .bootstrap(&genesis_account, config.initial_balance, &common_account)
                .unwrap();

            Self {
                storage,
                pool: TransactionPool::new(100),
                config,
                proposer,
                genesis,
            }
        }

        /// Funds an account directly in storage.
        fn fund(&self, balance: u64) -> Keypair {
            let kp = Keypair::generate();
            self.storage
                .put_account(&BlockAccount::new(kp.address(), Amount::new(balance)))
                .unwrap();
            kp
        }

        /// A signed payment pooled for inclusion.
        fn pooled_payment(&self, source: &Keypair, amount: u64) -> Transaction {
            let target = self.fund(1);
            let mut tx = Transaction::new(
                source.address(),
                0,
                vec![Operation::Payment(Payment {
                    target: target.address(),
                    amount: Amount::new(amount),
                })],
            )
            .unwrap();
            tx.sign(source, NETWORK);
            self.pool.add(tx.clone()).unwrap();
            tx
        }

        /// An ALLCONFIRM-worthy ballot over the given transactions.
        fn approved_ballot(&self, txs: &[Transaction]) -> Ballot {
            let basis = self.genesis.next_basis(0);
            let fee_total = Amount::checked_sum(txs.iter().map(|tx| tx.fee())).unwrap();
            let inflation = self.config.inflation_amount(basis.height).unwrap();

            let mut ptx = ProposerTransaction::new(
                self.proposer.address(),
                &basis,
                self.config.common_account_address.clone(),
                fee_total,
                txs.len() as u64,
                inflation,
            );
            ptx.sign(&self.proposer, NETWORK);

            let mut ballot = Ballot::new(
                self.proposer.address(),
                self.proposer.address(),
                basis,
                txs.iter().map(|tx| tx.hash().to_string()).collect(),
                ptx,
            );
            ballot.set_vote(BallotState::AllConfirm, VotingHole::Yes);
            ballot.sign(&self.proposer, NETWORK);
            ballot
        }

        fn common_balance(&self) -> Amount {
            self.storage
                .get_account(&self.config.common_account_address)
                .unwrap()
                .unwrap()
                .balance
        }
    }

    #[tokio::test]
    async fn empty_block_credits_inflation_only() {
        let fixture = Fixture::new();
        let ballot = fixture.approved_ballot(&[]);
        let expected_inflation = fixture.config.inflation_amount(2).unwrap();

        let before = fixture.common_balance();
        let block = finalize(
            &ballot,
            &fixture.storage,
            &fixture.pool,
            &NullFetcher,
            &fixture.config,
            &NullObserver,
        )
        .await
        .unwrap();

        assert_eq!(block.height, 2);
        assert_eq!(block.parent, fixture.genesis.hash);
        assert_eq!(
            fixture.common_balance(),
            before.checked_add(expected_inflation).unwrap()
        );
        assert_eq!(fixture.storage.latest_height().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn block_with_transactions_settles_fees_and_balances() {
        let fixture = Fixture::new();
        let alice = fixture.fund(1_000_000);
        let txs = vec![fixture.pooled_payment(&alice, 5_000)];
        let ballot = fixture.approved_ballot(&txs);

        let inflation = fixture.config.inflation_amount(2).unwrap();
        let fee_total = txs[0].fee();

        let before_common = fixture.common_balance();
        let block = finalize(
            &ballot,
            &fixture.storage,
            &fixture.pool,
            &NullFetcher,
            &fixture.config,
            &NullObserver,
        )
        .await
        .unwrap();

        // Common account: previous + fees + inflation.
        assert_eq!(
            fixture.common_balance(),
            before_common
                .checked_add(fee_total)
                .unwrap()
                .checked_add(inflation)
                .unwrap()
        );

        // Source paid amount + fee and its sequence advanced.
        let alice_account = fixture.storage.get_account(&alice.address()).unwrap().unwrap();
        assert_eq!(
            alice_account.balance,
            Amount::new(1_000_000 - 5_000 - fee_total.value())
        );
        assert_eq!(alice_account.sequence_id, 1);

        // The pool no longer holds the applied transaction.
        assert!(!fixture.pool.contains(txs[0].hash()));

        // Derived records: blocktx rows, stored ptx, stored operations.
        assert_eq!(
            fixture.storage.block_transactions(&block.hash).unwrap(),
            vec![txs[0].hash().to_string()]
        );
        let stored_ptx = fixture
            .storage
            .get_transaction(ballot.proposer_transaction().hash())
            .unwrap()
            .unwrap();
        assert_eq!(stored_ptx.fee(), Amount::ZERO);
        assert_eq!(stored_ptx.b.operations.len(), 2);

        let ptx_ops = fixture
            .storage
            .block_operations(block.height, ballot.proposer_transaction().hash())
            .unwrap();
        assert_eq!(ptx_ops.len(), 2);
        assert!(matches!(ptx_ops[0], Operation::CollectTxFee(_)));
        assert!(matches!(ptx_ops[1], Operation::Inflation(_)));
    }

    #[tokio::test]
    async fn missing_transaction_aborts_finalization() {
        let fixture = Fixture::new();
        let alice = fixture.fund(1_000_000);
        let txs = vec![fixture.pooled_payment(&alice, 100)];
        let ballot = fixture.approved_ballot(&txs);

        // The transaction vanishes between quorum and finalize.
        fixture.pool.remove(&[txs[0].hash().to_string()]);

        let result = finalize(
            &ballot,
            &fixture.storage,
            &fixture.pool,
            &NullFetcher,
            &fixture.config,
            &NullObserver,
        )
        .await;
        assert!(matches!(result, Err(Error::MissingTransaction(_))));
        // Nothing was committed.
        assert_eq!(fixture.storage.latest_height().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn insufficient_balance_is_apply_failure() {
        let fixture = Fixture::new();
        let pauper = fixture.fund(10);
        let txs = vec![fixture.pooled_payment(&pauper, 1_000_000)];
        let ballot = fixture.approved_ballot(&txs);

        let result = finalize(
            &ballot,
            &fixture.storage,
            &fixture.pool,
            &NullFetcher,
            &fixture.config,
            &NullObserver,
        )
        .await;
        assert!(matches!(result, Err(Error::ApplyFailure(_))));
        assert_eq!(fixture.storage.latest_height().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn sequence_mismatch_is_apply_failure() {
        let fixture = Fixture::new();
        let alice = fixture.fund(1_000_000);
        let target = fixture.fund(1);

        let mut tx = Transaction::new(
            alice.address(),
            7, // account sequence is 0
            vec![Operation::Payment(Payment {
                target: target.address(),
                amount: Amount::new(100),
            })],
        )
        .unwrap();
        tx.sign(&alice, NETWORK);
        fixture.pool.add(tx.clone()).unwrap();

        let ballot = fixture.approved_ballot(&[tx]);
        let result = finalize(
            &ballot,
            &fixture.storage,
            &fixture.pool,
            &NullFetcher,
            &fixture.config,
            &NullObserver,
        )
        .await;
        assert!(matches!(result, Err(Error::ApplyFailure(_))));
    }

    #[tokio::test]
    async fn observer_hears_about_finalized_block() {
        struct Recording {
            finalized: Mutex<Vec<(u64, usize, usize)>>,
        }
        impl ConsensusObserver for Recording {
            fn block_finalized(
                &self,
                height: u64,
                transactions: usize,
                operations: usize,
                _fees: Amount,
                _inflation: Amount,
            ) {
                self.finalized.lock().push((height, transactions, operations));
            }
        }

        let fixture = Fixture::new();
        let alice = fixture.fund(1_000_000);
        let txs = vec![fixture.pooled_payment(&alice, 100)];
        let ballot = fixture.approved_ballot(&txs);

        let observer = Recording {
            finalized: Mutex::new(Vec::new()),
        };
        finalize(
            &ballot,
            &fixture.storage,
            &fixture.pool,
            &NullFetcher,
            &fixture.config,
            &observer,
        )
        .await
        .unwrap();

        // One user tx with one operation, plus the two proposer operations.
        assert_eq!(*observer.finalized.lock(), vec![(2, 1, 3)]);
    }
}
