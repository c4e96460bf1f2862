//! # Proposer Transaction
//!
//! The synthetic transaction a proposer mints for every block: exactly two
//! operations, in order — [`CollectTxFee`] gathering the block's fees into
//! the common account, then [`Inflation`] minting the scheduled amount into
//! the same account. Its fee is always zero and its source must equal the
//! ballot's proposer.
//!
//! Validation is split the way the checker pipeline consumes it:
//!
//! - [`ProposerTransaction::is_well_formed`] — structural rules that hold
//!   for any ballot (fee, shape, order, duplicates, targets, overflow).
//! - [`ProposerTransaction::is_well_formed_with_ballot`] — rules relating
//!   the transaction to its carrying ballot (source, tx count, block data).
//! - The INIT-phase checker stages compare amounts against the actual pool
//!   contents and the inflation schedule; those need chain state and live
//!   in the checker, not here.

use serde::{Deserialize, Serialize};

use crate::common::Amount;
use crate::config::Config;
use crate::crypto::keys::Keypair;
use crate::error::{Error, Result};
use crate::transaction::{CollectTxFee, Inflation, Operation, Transaction, TransactionBody, TransactionHeader};
use crate::voting::Basis;

/// The proposer's fee-and-inflation transaction, a constrained
/// [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposerTransaction(pub Transaction);

impl ProposerTransaction {
    /// Assembles the proposer transaction for a proposal.
    ///
    /// `fee_total` must be the checked sum of fees over the transactions
    /// the proposal references; `inflation_amount` must follow the
    /// schedule for `basis.height`. The sequence id is pinned to the basis
    /// height, which keeps the transaction content deterministic for a
    /// given proposal.
    pub fn new(
        proposer: String,
        basis: &Basis,
        common_account: String,
        fee_total: Amount,
        tx_count: u64,
        inflation_amount: Amount,
    ) -> Self {
        let collect = Operation::CollectTxFee(CollectTxFee {
            target: common_account.clone(),
            amount: fee_total,
            height: basis.height,
            block_hash: basis.block_hash.clone(),
            total_txs: basis.total_txs,
            txs: tx_count,
        });
        let inflation = Operation::Inflation(Inflation {
            target: common_account,
            amount: inflation_amount,
            height: basis.height,
            block_hash: basis.block_hash.clone(),
            total_txs: basis.total_txs,
        });

        ProposerTransaction(Transaction {
            h: TransactionHeader::default(),
            b: TransactionBody {
                source: proposer,
                fee: Amount::ZERO,
                sequence_id: basis.height,
                operations: vec![collect, inflation],
            },
        })
    }

    /// A contentless placeholder carried by EXPIRED ballots, which vote on
    /// a proposer's absence rather than on a proposal.
    pub fn empty() -> Self {
        ProposerTransaction(Transaction {
            h: TransactionHeader::default(),
            b: TransactionBody {
                source: String::new(),
                fee: Amount::ZERO,
                sequence_id: 0,
                operations: Vec::new(),
            },
        })
    }

    /// Signs the underlying transaction with the proposer's key.
    pub fn sign(&mut self, keypair: &Keypair, network_id: &[u8]) {
        self.0.sign(keypair, network_id);
    }

    /// The content hash of the underlying transaction.
    pub fn hash(&self) -> &str {
        self.0.hash()
    }

    /// The source address, which must equal the ballot proposer.
    pub fn source(&self) -> &str {
        self.0.source()
    }

    /// The fee-collection operation (always the first).
    pub fn collect_tx_fee(&self) -> Result<&CollectTxFee> {
        match self.0.b.operations.first() {
            Some(Operation::CollectTxFee(op)) => Ok(op),
            _ => Err(Error::InvalidProposerTransaction(
                "missing collect-tx-fee operation".into(),
            )),
        }
    }

    /// The inflation operation (always the second).
    pub fn inflation(&self) -> Result<&Inflation> {
        match self.0.b.operations.get(1) {
            Some(Operation::Inflation(op)) => Ok(op),
            _ => Err(Error::InvalidProposerTransaction(
                "missing inflation operation".into(),
            )),
        }
    }

    /// Total amount credited to the common account by this transaction.
    pub fn total_amount(&self) -> Result<Amount> {
        let collect = self.collect_tx_fee()?;
        let inflation = self.inflation()?;
        collect.amount.checked_add(inflation.amount)
    }

    /// Structural validation independent of the carrying ballot.
    ///
    /// Checks, in order: zero fee, exactly two operations in
    /// [CollectTxFee, Inflation] order, no duplicated operations by
    /// canonical hash, both targets equal to the configured common
    /// account, and non-overflowing amounts.
    pub fn is_well_formed(&self, config: &Config) -> Result<()> {
        if !self.0.b.fee.is_zero() {
            return Err(Error::InvalidFee);
        }
        if self.0.b.operations.len() != 2 {
            return Err(Error::InvalidProposerTransaction(format!(
                "expected 2 operations, found {}",
                self.0.b.operations.len()
            )));
        }

        let ops = &self.0.b.operations;
        if ops[0].hash() == ops[1].hash() {
            return Err(Error::DuplicatedOperation);
        }

        let collect = self.collect_tx_fee()?;
        let inflation = self.inflation()?;

        if collect.target != config.common_account_address {
            return Err(Error::InvalidProposerTransaction(
                "collect-tx-fee target is not the common account".into(),
            ));
        }
        if inflation.target != config.common_account_address {
            return Err(Error::InvalidProposerTransaction(
                "inflation target is not the common account".into(),
            ));
        }

        // Overflow of the combined credit is unrepresentable on-chain.
        collect.amount.checked_add(inflation.amount)?;

        Ok(())
    }

    /// Validation against the carrying ballot.
    ///
    /// The source must be the ballot's proposer (the transaction must be
    /// signed by the same key as the ballot), the declared transaction
    /// count must match the ballot's list, and both operations must carry
    /// the ballot's basis block data.
    pub fn is_well_formed_with_ballot(
        &self,
        proposer: &str,
        transactions: &[String],
        basis: &Basis,
    ) -> Result<()> {
        if self.source() != proposer {
            return Err(Error::InvalidProposerTransaction(
                "source differs from ballot proposer".into(),
            ));
        }

        let collect = self.collect_tx_fee()?;
        if collect.txs != transactions.len() as u64 {
            return Err(Error::InvalidOperation(format!(
                "collect-tx-fee declares {} transactions, ballot carries {}",
                collect.txs,
                transactions.len()
            )));
        }
        if collect.height != basis.height
            || collect.block_hash != basis.block_hash
            || collect.total_txs != basis.total_txs
        {
            return Err(Error::InvalidOperation(
                "collect-tx-fee block data disagrees with voting basis".into(),
            ));
        }

        let inflation = self.inflation()?;
        if inflation.height != basis.height
            || inflation.block_hash != basis.block_hash
            || inflation.total_txs != basis.total_txs
        {
            return Err(Error::InvalidOperation(
                "inflation block data disagrees with voting basis".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    fn basis() -> Basis {
        Basis {
            height: 5,
            round: 0,
            block_hash: "parenthash".into(),
            total_txs: 42,
            total_ops: 80,
        }
    }

    fn config_with_common(common: &str) -> Config {
        Config {
            common_account_address: common.to_string(),
            ..Config::default()
        }
    }

    fn make_ptx(proposer: &Keypair, common: &str, fees: u64, txs: u64) -> ProposerTransaction {
        let mut ptx = ProposerTransaction::new(
            proposer.address(),
            &basis(),
            common.to_string(),
            Amount::new(fees),
            txs,
            Amount::new(1_000),
        );
        ptx.sign(proposer, b"test-net");
        ptx
    }

    #[test]
    fn well_formed_accepts_canonical_shape() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let ptx = make_ptx(&proposer, &common, 30_000, 3);

        let config = config_with_common(&common);
        assert!(ptx.is_well_formed(&config).is_ok());
        assert!(ptx
            .is_well_formed_with_ballot(&proposer.address(), &["a".into(), "b".into(), "c".into()], &basis())
            .is_ok());
    }

    #[test]
    fn nonzero_fee_rejected() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let mut ptx = make_ptx(&proposer, &common, 0, 0);
        ptx.0.b.fee = Amount::new(1);

        let config = config_with_common(&common);
        assert!(matches!(ptx.is_well_formed(&config), Err(Error::InvalidFee)));
    }

    #[test]
    fn duplicated_operation_rejected() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let mut ptx = make_ptx(&proposer, &common, 0, 0);
        let op = ptx.0.b.operations[0].clone();
        ptx.0.b.operations = vec![op.clone(), op];

        let config = config_with_common(&common);
        assert!(matches!(
            ptx.is_well_formed(&config),
            Err(Error::DuplicatedOperation)
        ));
    }

    #[test]
    fn wrong_operation_count_rejected() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let mut ptx = make_ptx(&proposer, &common, 0, 0);
        let extra = ptx.0.b.operations[1].clone();
        ptx.0.b.operations.push(extra);

        let config = config_with_common(&common);
        assert!(matches!(
            ptx.is_well_formed(&config),
            Err(Error::InvalidProposerTransaction(_)) | Err(Error::DuplicatedOperation)
        ));
    }

    #[test]
    fn wrong_operation_order_rejected() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let mut ptx = make_ptx(&proposer, &common, 0, 0);
        ptx.0.b.operations.reverse();

        let config = config_with_common(&common);
        assert!(ptx.is_well_formed(&config).is_err());
    }

    #[test]
    fn wrong_common_account_rejected() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let other = Keypair::generate().address();
        let ptx = make_ptx(&proposer, &common, 0, 0);

        let config = config_with_common(&other);
        assert!(matches!(
            ptx.is_well_formed(&config),
            Err(Error::InvalidProposerTransaction(_))
        ));
    }

    #[test]
    fn overflowing_amounts_rejected() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let mut ptx = ProposerTransaction::new(
            proposer.address(),
            &basis(),
            common.clone(),
            Amount::new(u64::MAX),
            0,
            Amount::new(1),
        );
        ptx.sign(&proposer, b"test-net");

        let config = config_with_common(&common);
        assert!(matches!(
            ptx.is_well_formed(&config),
            Err(Error::AmountOverflow)
        ));
    }

    #[test]
    fn foreign_source_rejected_against_ballot() {
        let proposer = Keypair::generate();
        let stranger = Keypair::generate();
        let common = Keypair::generate().address();
        let mut ptx = make_ptx(&proposer, &common, 0, 0);
        ptx.0.b.source = stranger.address();
        ptx.sign(&stranger, b"test-net");

        assert!(matches!(
            ptx.is_well_formed_with_ballot(&proposer.address(), &[], &basis()),
            Err(Error::InvalidProposerTransaction(_))
        ));
    }

    #[test]
    fn wrong_tx_count_rejected_against_ballot() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let ptx = make_ptx(&proposer, &common, 20_000, 2);

        // Ballot carries three transactions, collect-tx-fee declares two.
        let txs = vec!["a".into(), "b".into(), "c".into()];
        assert!(matches!(
            ptx.is_well_formed_with_ballot(&proposer.address(), &txs, &basis()),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn wrong_block_data_rejected_against_ballot() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let ptx = make_ptx(&proposer, &common, 0, 0);

        for mutate in [
            |b: &mut Basis| b.height += 1,
            |b: &mut Basis| b.block_hash.push_str("showme"),
            |b: &mut Basis| b.total_txs += 2,
        ] {
            let mut wrong = basis();
            mutate(&mut wrong);
            assert!(matches!(
                ptx.is_well_formed_with_ballot(&proposer.address(), &[], &wrong),
                Err(Error::InvalidOperation(_))
            ));
        }
    }

    #[test]
    fn total_amount_is_fees_plus_inflation() {
        let proposer = Keypair::generate();
        let common = Keypair::generate().address();
        let ptx = make_ptx(&proposer, &common, 40_000, 4);
        assert_eq!(ptx.total_amount().unwrap(), Amount::new(41_000));
    }
}
