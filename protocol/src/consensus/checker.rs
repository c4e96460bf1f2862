//! # Ballot Checker Pipeline
//!
//! The staged validator every inbound ballot passes before it may touch
//! the consensus core. Stages run in fixed order over an immutable
//! context; the first failure ends the run. Outcomes fall in two classes:
//!
//! - `Err(_)` — the ballot never enters a tally. `BadForm`,
//!   `BadSignature`, `StaleBasis`, and `FutureBasis` are drop-class;
//!   the caller counts them and, for `FutureBasis`, buffers the ballot.
//! - `Ok(CheckedBallot)` — the ballot is tallied, and `decision` carries
//!   the verdict to merge: for an INIT proposal the local node's own
//!   YES/NO (semantic faults become NO votes to keep the protocol live),
//!   for every other ballot the sender's vote.
//!
//! Base stages: parse → signature → well-formed → basis window →
//! proposer-transaction well-formed. INIT proposals additionally get the
//! semantic stages: block data against the latest block, transaction
//! resolution (with peer fetch and retry budget), fee sum, and the
//! inflation schedule.

use tracing::{debug, warn};

use crate::ballot::Ballot;
use crate::common::Amount;
use crate::config::Config;
use crate::consensus::isaac::{BasisPlacement, IsaacState};
use crate::error::{Error, Result};
use crate::network::{TransactionFetcher, TransactionPool};
use crate::storage::Block;
use crate::transaction::Transaction;
use crate::voting::{BallotState, VotingHole};

/// A ballot that passed the pipeline, with the decision to merge.
#[derive(Debug)]
pub struct CheckedBallot {
    pub ballot: Ballot,
    /// The verdict: the local node's own for an INIT proposal, the
    /// sender's vote otherwise.
    pub decision: VotingHole,
    /// The semantic fault behind a NO decision, kept for diagnostics.
    pub fault: Option<Error>,
}

/// The immutable context the stages read.
pub struct BallotChecker<'a> {
    pub config: &'a Config,
    pub latest_block: &'a Block,
    pub state: IsaacState,
    pub pool: &'a TransactionPool,
    pub fetcher: &'a dyn TransactionFetcher,
}

impl<'a> BallotChecker<'a> {
    /// Stage 1: parse raw wire bytes.
    pub fn parse(bytes: &[u8]) -> Result<Ballot> {
        Ballot::deserialize(bytes)
    }

    /// Runs stages 2..n over a parsed ballot.
    pub async fn check(&self, ballot: Ballot) -> Result<CheckedBallot> {
        // Stage 2: sender signature over the canonical bytes.
        ballot.verify(&self.config.network_id)?;

        // Stage 3: envelope well-formedness and membership.
        ballot.is_well_formed(self.config)?;
        if !self.config.is_validator(ballot.from()) {
            return Err(Error::BadForm(format!(
                "sender {} is not a validator",
                ballot.from()
            )));
        }

        // Basis window first: a slot this node is not tracking gets no
        // further validation.
        match self.placement(&ballot) {
            BasisPlacement::Current => {}
            BasisPlacement::Stale => {
                return Err(Error::StaleBasis {
                    ballot: ballot.basis().clone(),
                    local_height: self.state.height,
                    local_round: self.state.round,
                });
            }
            BasisPlacement::Future => {
                return Err(Error::FutureBasis {
                    ballot_height: ballot.basis().height,
                    local_height: self.state.height,
                });
            }
        }

        // An EXPIRED ballot votes on the proposer's absence; it carries no
        // proposal to validate.
        if ballot.vote() == VotingHole::Expired {
            return Ok(CheckedBallot {
                ballot,
                decision: VotingHole::Expired,
                fault: None,
            });
        }

        // Stage 4: proposer-transaction well-formedness.
        if let Err(fault) = self.check_proposer_transaction(&ballot) {
            return self.semantic_fault(ballot, fault);
        }

        // INIT proposals get the semantic stages; every other ballot is
        // tallied with its sender's vote.
        let is_proposal =
            ballot.state() == BallotState::Init && ballot.from() == ballot.proposer();
        if !is_proposal {
            let decision = ballot.vote();
            return Ok(CheckedBallot {
                ballot,
                decision,
                fault: None,
            });
        }

        if let Err(fault) = self.check_init_stages(&ballot).await {
            return self.semantic_fault(ballot, fault);
        }

        debug!(ballot = %ballot, "proposal validated, voting YES");
        Ok(CheckedBallot {
            ballot,
            decision: VotingHole::Yes,
            fault: None,
        })
    }

    fn placement(&self, ballot: &Ballot) -> BasisPlacement {
        let basis = ballot.basis();
        if basis.height < self.state.height {
            BasisPlacement::Stale
        } else if basis.height > self.state.height {
            BasisPlacement::Future
        } else if basis.round < self.state.round {
            BasisPlacement::Stale
        } else {
            BasisPlacement::Current
        }
    }

    /// Semantic faults keep the protocol live: the ballot is tallied and
    /// the local verdict is NO.
    fn semantic_fault(&self, ballot: Ballot, fault: Error) -> Result<CheckedBallot> {
        warn!(ballot = %ballot, fault = %fault, "ballot faulted, voting NO");
        Ok(CheckedBallot {
            ballot,
            decision: VotingHole::No,
            fault: Some(fault),
        })
    }

    fn check_proposer_transaction(&self, ballot: &Ballot) -> Result<()> {
        let ptx = ballot.proposer_transaction();
        ptx.is_well_formed(self.config)?;
        ptx.0.verify(&self.config.network_id)?;
        ptx.is_well_formed_with_ballot(ballot.proposer(), ballot.transactions(), ballot.basis())
    }

    /// INIT-phase semantic stages against chain state and the pool.
    async fn check_init_stages(&self, ballot: &Ballot) -> Result<()> {
        let ptx = ballot.proposer_transaction();
        let collect = ptx.collect_tx_fee()?;

        // Declared block data must match the block this node would build on.
        if collect.height != self.latest_block.height
            || collect.block_hash != self.latest_block.hash
            || collect.total_txs != self.latest_block.total_txs
        {
            return Err(Error::InvalidOperation(
                "proposer transaction block data disagrees with the latest block".into(),
            ));
        }

        // The inflation amount follows the schedule, not the proposer.
        let inflation = ptx.inflation()?;
        let expected_inflation = self.config.inflation_amount(collect.height)?;
        if inflation.amount != expected_inflation {
            return Err(Error::InvalidOperation(format!(
                "inflation amount {} differs from scheduled {}",
                inflation.amount, expected_inflation
            )));
        }

        // Resolve every referenced transaction, pulling gaps from peers.
        let transactions = self.resolve_transactions(ballot.transactions()).await?;

        // Each referenced transaction must itself be valid.
        for tx in &transactions {
            tx.verify(&self.config.network_id)?;
            tx.is_well_formed(self.config)?;
        }

        // The collected amount must equal the fee sum exactly.
        let fee_total = Amount::checked_sum(transactions.iter().map(|tx| tx.fee()))?;
        if collect.amount != fee_total {
            return Err(Error::InvalidOperation(format!(
                "collected fee {} differs from transaction fee sum {}",
                collect.amount, fee_total
            )));
        }

        Ok(())
    }

    /// Resolves the referenced hashes against the pool, fetching missing
    /// entries from peers within the retry budget.
    async fn resolve_transactions(&self, hashes: &[String]) -> Result<Vec<Transaction>> {
        let mut resolved = self.pool.get_all(hashes);

        for _attempt in 0..=self.config.tx_fetch_retries {
            let missing: Vec<String> = hashes
                .iter()
                .zip(&resolved)
                .filter(|(_, tx)| tx.is_none())
                .map(|(hash, _)| hash.clone())
                .collect();
            if missing.is_empty() {
                break;
            }

            match self.fetcher.fetch(&missing).await {
                Ok(fetched) => {
                    for tx in fetched {
                        // Fetched transactions join the pool only after
                        // standing on their own.
                        if tx.verify(&self.config.network_id).is_ok()
                            && tx.is_well_formed(self.config).is_ok()
                        {
                            let _ = self.pool.add(tx);
                        }
                    }
                    resolved = self.pool.get_all(hashes);
                }
                Err(error) => {
                    debug!(error = %error, "transaction fetch attempt failed");
                }
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
}
