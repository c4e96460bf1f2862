//! # State Manager
//!
//! The single logical owner of the consensus core. One task runs the
//! manager's loop; network intake workers only ever touch the bounded
//! [`BallotQueue`]. Every mutation of running rounds, tallies, and the
//! ISAAC state happens here, which makes tally monotonicity a property of
//! the structure rather than of lock discipline.
//!
//! Responsibilities:
//!
//! - drive the phase ladder under quorum decisions:
//!   INIT → SIGN → ACCEPT → ALLCONFIRM → finalize → next height;
//! - abandon rounds on NO/EXPIRED quorum and re-elect the proposer;
//! - arm the per-phase timers and vote EXPIRED when they fire;
//! - assemble, sign, and broadcast the local node's own ballots,
//!   including the proposal when the local node is elected.
//!
//! The manager pushes its own ballots into its own queue — `broadcast`
//! reaches peers only — so every ballot, local or remote, flows through
//! the same checker pipeline and tally path.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::ballot::{Ballot, ProposerTransaction};
use crate::common::Amount;
use crate::config::Config;
use crate::consensus::checker::{BallotChecker, CheckedBallot};
use crate::consensus::isaac::{Decision, Isaac, IsaacState};
use crate::consensus::proposer::{ProposerSelector, RoundRobinSelector};
use crate::crypto::keys::Keypair;
use crate::error::{Error, Result};
use crate::network::{BallotQueue, BallotSender, TransactionFetcher, TransactionPool};
use crate::observer::{ConsensusObserver, NullObserver};
use crate::storage::{Block, Storage};
use crate::voting::{BallotState, VotingHole};

/// Upper bound on buffered future-height ballots awaiting sync.
const FUTURE_BUFFER_LIMIT: usize = 256;

/// Timer-driven owner of the ISAAC core.
pub struct StateManager {
    config: Config,
    keypair: Keypair,
    isaac: Isaac,
    storage: Storage,
    pool: Arc<TransactionPool>,
    queue: Arc<BallotQueue>,
    sender: Arc<dyn BallotSender>,
    fetcher: Arc<dyn TransactionFetcher>,
    selector: Box<dyn ProposerSelector>,
    observer: Arc<dyn ConsensusObserver>,
    transit: Option<mpsc::UnboundedSender<IsaacState>>,
    future_ballots: Vec<Ballot>,
    deadline: Instant,
    /// When the current round opened; finalize latency is measured from
    /// here.
    round_started_at: Instant,
}

impl StateManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        keypair: Keypair,
        isaac: Isaac,
        storage: Storage,
        pool: Arc<TransactionPool>,
        queue: Arc<BallotQueue>,
        sender: Arc<dyn BallotSender>,
        fetcher: Arc<dyn TransactionFetcher>,
    ) -> Self {
        Self {
            config,
            keypair,
            isaac,
            storage,
            pool,
            queue,
            sender,
            fetcher,
            selector: Box::new(RoundRobinSelector),
            observer: Arc::new(NullObserver),
            transit: None,
            future_ballots: Vec::new(),
            deadline: Instant::now(),
            round_started_at: Instant::now(),
        }
    }

    /// Replaces the proposer selector. Tests pin proposals with
    /// [`FixedSelector`](crate::consensus::proposer::FixedSelector).
    pub fn with_selector(mut self, selector: Box<dyn ProposerSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Installs the metrics observer.
    pub fn with_observer(mut self, observer: Arc<dyn ConsensusObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Registers a channel receiving every ISAAC state transition. Test
    /// harnesses use this to follow the phase ladder.
    pub fn set_transit_signal(&mut self, transit: mpsc::UnboundedSender<IsaacState>) {
        self.transit = Some(transit);
    }

    pub fn isaac(&self) -> &Isaac {
        &self.isaac
    }

    pub fn state(&self) -> IsaacState {
        self.isaac.state()
    }

    fn address(&self) -> String {
        self.keypair.address()
    }

    /// The proposer elected for a slot.
    pub fn proposer_for(&self, height: u64, round: u32) -> String {
        self.selector
            .select(&self.config.validators, height, round)
    }

    /// The proposer elected for the current slot.
    pub fn expected_proposer(&self) -> String {
        let state = self.isaac.state();
        self.proposer_for(state.height, state.round)
    }

    fn is_local_proposer(&self) -> bool {
        self.expected_proposer() == self.address()
    }

    fn signal_transit(&self) {
        if let Some(transit) = &self.transit {
            let _ = transit.send(self.isaac.state());
        }
    }

    fn phase_timeout(&self, state: BallotState) -> Duration {
        match state {
            BallotState::Sign => self.config.timeout_sign,
            BallotState::Accept | BallotState::AllConfirm => self.config.timeout_accept,
            _ => self.config.timeout_init,
        }
    }

    fn reset_deadline(&mut self) {
        let timeout = self.phase_timeout(self.isaac.state().ballot_state);
        self.deadline = Instant::now() + timeout;
    }

    // -----------------------------------------------------------------------
    // Round lifecycle
    // -----------------------------------------------------------------------

    /// Opens the current `(height, round)` slot: arms the INIT timer,
    /// releases buffered ballots that became current, and proposes if the
    /// local node is the elected proposer.
    pub async fn start_round(&mut self) -> Result<()> {
        let state = self.isaac.state();
        self.queue.set_current_height(state.height);
        self.signal_transit();
        self.reset_deadline();
        self.round_started_at = Instant::now();

        // Buffered future ballots may have become current.
        let current_height = state.height;
        let (ready, still_future): (Vec<Ballot>, Vec<Ballot>) = self
            .future_ballots
            .drain(..)
            .partition(|b| b.basis().height <= current_height);
        self.future_ballots = still_future;
        for ballot in ready {
            self.queue.push(ballot);
        }

        if self.is_local_proposer() {
            self.propose().await?;
        } else {
            debug!(
                proposer = %self.expected_proposer(),
                state = %self.isaac.state(),
                "waiting for elected proposer"
            );
        }
        Ok(())
    }

    /// Assembles, signs, broadcasts, and self-queues the INIT proposal.
    async fn propose(&mut self) -> Result<()> {
        let state = self.isaac.state();
        let basis = self.isaac.latest_block().next_basis(state.round);

        let transactions = self
            .pool
            .availables(self.config.txs_limit, self.config.ops_limit);
        let fee_total = Amount::checked_sum(transactions.iter().map(|tx| tx.fee()))?;
        let inflation = self.config.inflation_amount(basis.height)?;

        let mut ptx = ProposerTransaction::new(
            self.address(),
            &basis,
            self.config.common_account_address.clone(),
            fee_total,
            transactions.len() as u64,
            inflation,
        );
        ptx.sign(&self.keypair, &self.config.network_id);

        let mut ballot = Ballot::new(
            self.address(),
            self.address(),
            basis,
            transactions
                .iter()
                .map(|tx| tx.hash().to_string())
                .collect(),
            ptx,
        );
        ballot.set_vote(BallotState::Init, VotingHole::Yes);
        ballot.sign(&self.keypair, &self.config.network_id);

        info!(
            height = state.height,
            round = state.round,
            txs = ballot.transactions().len(),
            "proposing"
        );
        self.sender.broadcast(&ballot).await?;
        self.queue.push(ballot);
        Ok(())
    }

    /// Signs and sends a ballot to peers and to the local queue.
    async fn emit(&mut self, mut ballot: Ballot) -> Result<()> {
        ballot.sign(&self.keypair, &self.config.network_id);
        self.sender.broadcast(&ballot).await?;
        self.queue.push(ballot);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ballot intake
    // -----------------------------------------------------------------------

    /// Runs one inbound ballot through the checker, the tally, and any
    /// transition it triggers. Returns the block if this ballot completed
    /// a height.
    pub async fn handle_ballot(&mut self, ballot: Ballot) -> Result<Option<Block>> {
        // Kept aside so a future-height ballot survives the checker's
        // consumption and can be buffered.
        let ahead = ballot.basis().height > self.isaac.state().height;
        let future_copy = ahead.then(|| ballot.clone());

        let checker = BallotChecker {
            config: &self.config,
            latest_block: self.isaac.latest_block(),
            state: self.isaac.state(),
            pool: self.pool.as_ref(),
            fetcher: &*self.fetcher,
        };

        let checked = match checker.check(ballot).await {
            Ok(checked) => checked,
            Err(Error::StaleBasis { ballot, .. }) => {
                debug!(basis = %ballot, "stale ballot dropped");
                self.observer.ballot_dropped("stale-basis");
                return Ok(None);
            }
            Err(Error::FutureBasis {
                ballot_height,
                local_height,
            }) => {
                // The node is behind; hold the ballot and let the sync
                // path catch the chain up out-of-band.
                warn!(
                    ballot_height,
                    local_height, "future ballot buffered, node is behind"
                );
                if let Some(copy) = future_copy {
                    self.buffer_future_ballot(copy);
                }
                return Ok(None);
            }
            Err(error) => {
                warn!(error = %error, "ballot dropped");
                self.observer.ballot_dropped("invalid");
                return Ok(None);
            }
        };

        self.process_checked(checked).await
    }

    /// Buffers a ballot that is ahead of the local chain.
    pub fn buffer_future_ballot(&mut self, ballot: Ballot) {
        if self.future_ballots.len() < FUTURE_BUFFER_LIMIT {
            self.future_ballots.push(ballot);
        } else {
            self.observer.ballot_dropped("future-buffer-full");
        }
    }

    async fn process_checked(&mut self, checked: CheckedBallot) -> Result<Option<Block>> {
        let CheckedBallot {
            ballot, decision, ..
        } = checked;

        let expected = self.proposer_for(ballot.basis().height, ballot.basis().round);
        if !self.isaac.receive_ballot(ballot.clone(), &expected) {
            return Ok(None);
        }
        self.observer.ballot_tallied(ballot.state(), ballot.vote());

        // A fresh proposal deserves the local node's own INIT vote.
        let is_foreign_proposal = ballot.state() == BallotState::Init
            && ballot.from() == ballot.proposer()
            && ballot.from() != self.address();
        if is_foreign_proposal && self.isaac.state().ballot_state == BallotState::Init {
            let own = Ballot::next_phase(&ballot, self.address(), BallotState::Init, decision);
            self.emit(own).await?;
        }

        match self.isaac.check_threshold(ballot.basis(), ballot.state()) {
            Some(decision) => self.handle_decision(decision).await,
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    async fn handle_decision(&mut self, decision: Decision) -> Result<Option<Block>> {
        let current = self.isaac.state();

        // Only the current slot and the current phase may transition;
        // a threshold stays crossed, so late ballots re-report old
        // decisions that were already acted on.
        if decision.basis.height != current.height
            || decision.basis.round != current.round
            || decision.state != current.ballot_state
        {
            return Ok(None);
        }

        self.observer
            .decision_reached(&decision.basis, decision.state, decision.vote);
        info!(
            state = %current,
            vote = %decision.vote,
            proposer = %decision.proposer,
            "threshold reached"
        );

        match decision.vote {
            VotingHole::Yes => self.advance_phase(decision).await,
            VotingHole::No | VotingHole::Expired => {
                self.abandon_round().await?;
                Ok(None)
            }
            VotingHole::NotYet => Ok(None),
        }
    }

    /// A YES quorum moves the ladder one phase up; the terminal phase
    /// finalizes.
    async fn advance_phase(&mut self, decision: Decision) -> Result<Option<Block>> {
        let Some(next_state) = self.isaac.state().ballot_state.next() else {
            return Ok(None);
        };

        let Some(proposal) = self
            .isaac
            .proposal(&decision.basis, &decision.proposer)
            .cloned()
        else {
            // A quorum exists for a proposal this node never saw; without
            // the content it can neither vote nor finalize.
            warn!(proposer = %decision.proposer, "quorum without local proposal");
            return Err(Error::MissingTransaction(format!(
                "proposal of {} for {}",
                decision.proposer, decision.basis
            )));
        };

        self.isaac.set_ballot_state(next_state);
        self.signal_transit();
        self.reset_deadline();

        let own = Ballot::next_phase(&proposal, self.address(), next_state, VotingHole::Yes);
        self.emit(own).await?;

        if next_state == BallotState::AllConfirm {
            let block = self.finalize(&proposal).await?;
            return Ok(Some(block));
        }
        Ok(None)
    }

    /// A NO or EXPIRED quorum abandons the round: the phase timer is
    /// cancelled and the slot re-opens at `round + 1` with a freshly
    /// elected proposer.
    async fn abandon_round(&mut self) -> Result<()> {
        let state = self.isaac.state();
        let next_round = state.round + 1;
        self.isaac.advance(state.height, next_round);
        self.observer.round_advanced(state.height, next_round);
        info!(height = state.height, round = next_round, "round abandoned");
        self.start_round().await
    }

    /// Commits the approved proposal and opens the next height.
    async fn finalize(&mut self, proposal: &Ballot) -> Result<Block> {
        let block = super::finalizer::finalize(
            proposal,
            &self.storage,
            &self.pool,
            &*self.fetcher,
            &self.config,
            &*self.observer,
        )
        .await?;

        // Measured before the next round resets the clock.
        self.observer
            .finalize_latency(self.round_started_at.elapsed().as_secs_f64());

        self.isaac.set_latest_block(block.clone());
        self.start_round().await?;
        Ok(block)
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// The phase deadline passed: vote EXPIRED at the current phase and
    /// re-arm the timer.
    pub async fn handle_timeout(&mut self) -> Result<()> {
        let state = self.isaac.state();
        let basis = self.isaac.latest_block().next_basis(state.round);
        warn!(state = %state, "phase timed out, voting EXPIRED");

        let expired = Ballot::new_expired(
            self.expected_proposer(),
            self.address(),
            basis,
            state.ballot_state,
        );
        self.reset_deadline();
        self.emit(expired).await
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    /// Runs the consensus loop until shutdown.
    ///
    /// `ApplyFailure` and finalize-time `MissingTransaction` abort the
    /// loop — both mean the node can no longer follow a quorum-approved
    /// chain. Everything else is logged and survived.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(state = %self.isaac.state(), "state manager starting");
        self.start_round().await?;

        loop {
            let queue = Arc::clone(&self.queue);
            tokio::select! {
                ballot = queue.pop() => {
                    match self.handle_ballot(ballot).await {
                        Ok(_) => {}
                        Err(error @ (Error::ApplyFailure(_)
                            | Error::MissingTransaction(_)
                            | Error::Storage(_))) => {
                            error!(error = %error, "fatal consensus error");
                            return Err(error);
                        }
                        Err(error) => {
                            warn!(error = %error, "ballot handling failed");
                        }
                    }
                    self.observer.queue_dropped_total(self.queue.dropped_count());
                }
                _ = sleep_until(self.deadline) => {
                    self.handle_timeout().await?;
                }
                _ = shutdown.changed() => {
                    info!("state manager shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Drains and processes queued ballots until the queue runs dry or
    /// `max_blocks` heights complete. Test harnesses use this to step the
    /// protocol deterministically without timers; the bound matters
    /// because a completed height immediately queues the next proposal.
    pub async fn pump(&mut self, max_blocks: usize) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        while blocks.len() < max_blocks {
            let Some(ballot) = self.queue.try_pop() else {
                break;
            };
            if let Some(block) = self.handle_ballot(ballot).await? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NullFetcher, NullSender};
    use crate::transaction::{Operation, Payment, Transaction};

    const NETWORK: &[u8] = b"test-net";

    /// Single-validator node: quorum is 1, so the node's own ballots walk
    /// the full ladder by themselves.
    struct SoloNode {
        manager: StateManager,
        storage: Storage,
        pool: Arc<TransactionPool>,
        config: Config,
    }

    fn solo_node() -> SoloNode {
        let keypair = Keypair::generate();
        let common_account = Keypair::generate().address();
        let genesis_account = Keypair::generate().address();

        let config = Config {
            network_id: NETWORK.to_vec(),
            validators: vec![keypair.address()],
            common_account_address: common_account.clone(),
            initial_balance: Amount::new(10_000_000_000),
            ..Config::default()
        };

        let storage = Storage::open_temporary().unwrap();
        let genesis = storage
            .bootstrap(&genesis_account, config.initial_balance, &common_account)
            .unwrap();

        let pool = Arc::new(TransactionPool::new(1_000));
        let queue = Arc::new(BallotQueue::new(64));
        let isaac = Isaac::new(config.clone(), genesis);

        let manager = StateManager::new(
            config.clone(),
            keypair,
            isaac,
            storage.clone(),
            Arc::clone(&pool),
            queue,
            Arc::new(NullSender),
            Arc::new(NullFetcher),
        );

        SoloNode {
            manager,
            storage,
            pool,
            config,
        }
    }

    fn funded_payment(node: &SoloNode, balance: u64, amount: u64) -> Transaction {
        let kp = Keypair::generate();
        node.storage
            .put_account(&crate::storage::BlockAccount::new(
                kp.address(),
                Amount::new(balance),
            ))
            .unwrap();
        let target = Keypair::generate();
        node.storage
            .put_account(&crate::storage::BlockAccount::new(
                target.address(),
                Amount::new(1),
            ))
            .unwrap();

        let mut tx = Transaction::new(
            kp.address(),
            0,
            vec![Operation::Payment(Payment {
                target: target.address(),
                amount: Amount::new(amount),
            })],
        )
        .unwrap();
        tx.sign(&kp, NETWORK);
        tx
    }

    #[tokio::test]
    async fn solo_node_walks_the_ladder_to_a_block() {
        let mut node = solo_node();
        let tx = funded_payment(&node, 1_000_000, 2_500);
        node.pool.add(tx.clone()).unwrap();

        node.manager.start_round().await.unwrap();
        let blocks = node.manager.pump(1).await.unwrap();

        // One height completed; the next proposal is already queued by
        // start_round.
        assert!(!blocks.is_empty());
        assert_eq!(blocks[0].height, 2);
        assert_eq!(blocks[0].transactions, vec![tx.hash().to_string()]);

        // ISAAC advanced past height 2.
        assert!(node.manager.state().height >= 2);
        assert!(node.storage.latest_height().unwrap().unwrap() >= 2);

        // The pool no longer holds the applied transaction.
        assert!(!node.pool.contains(tx.hash()));

        // The common account was credited with fee + inflation.
        let inflation = node.config.inflation_amount(1).unwrap();
        let common = node
            .storage
            .get_account(&node.config.common_account_address)
            .unwrap()
            .unwrap();
        assert!(common.balance >= tx.fee().checked_add(inflation).unwrap());
    }

    #[tokio::test]
    async fn transit_signal_reports_the_phase_ladder() {
        let mut node = solo_node();
        let (tx_signal, mut rx_signal) = mpsc::unbounded_channel();
        node.manager.set_transit_signal(tx_signal);

        node.manager.start_round().await.unwrap();
        node.manager.pump(1).await.unwrap();

        let mut states = Vec::new();
        while let Ok(state) = rx_signal.try_recv() {
            states.push((state.height, state.ballot_state));
        }

        // The first height must walk INIT → SIGN → ACCEPT → ALLCONFIRM
        // and re-open at the next height's INIT.
        let first_height: Vec<BallotState> = states
            .iter()
            .filter(|(h, _)| *h == 1)
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(
            first_height,
            vec![
                BallotState::Init,
                BallotState::Sign,
                BallotState::Accept,
                BallotState::AllConfirm,
            ]
        );
        assert!(states.iter().any(|(h, s)| *h == 2 && *s == BallotState::Init));
    }

    #[tokio::test]
    async fn timeout_expires_the_round_and_reelects() {
        let mut node = solo_node();
        // The elected proposer is a silent foreign validator.
        let silent = Keypair::generate().address();
        node.manager = node
            .manager
            .with_selector(Box::new(crate::consensus::proposer::FixedSelector(silent)));

        node.manager.start_round().await.unwrap();
        assert_eq!(node.manager.state().round, 0);

        // The INIT timer fires; the solo node's EXPIRED vote is quorum.
        node.manager.handle_timeout().await.unwrap();
        node.manager.pump(1).await.unwrap();

        assert_eq!(node.manager.state().round, 1);
        assert_eq!(node.manager.state().ballot_state, BallotState::Init);
        // No block was committed at this height.
        assert_eq!(node.storage.latest_height().unwrap(), Some(1));
    }

    struct RecordingObserver {
        rounds: parking_lot::Mutex<Vec<(u64, u32)>>,
        latencies: parking_lot::Mutex<Vec<f64>>,
    }

    impl RecordingObserver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                rounds: parking_lot::Mutex::new(Vec::new()),
                latencies: parking_lot::Mutex::new(Vec::new()),
            })
        }
    }

    impl ConsensusObserver for RecordingObserver {
        fn round_advanced(&self, height: u64, round: u32) {
            self.rounds.lock().push((height, round));
        }
        fn finalize_latency(&self, seconds: f64) {
            self.latencies.lock().push(seconds);
        }
    }

    #[tokio::test]
    async fn observer_hears_finalize_latency() {
        let mut node = solo_node();
        let observer = RecordingObserver::new();
        node.manager = node
            .manager
            .with_observer(Arc::clone(&observer) as Arc<dyn ConsensusObserver>);

        node.manager.start_round().await.unwrap();
        node.manager.pump(1).await.unwrap();

        // One completed height, one latency sample, no round abandoned.
        let latencies = observer.latencies.lock();
        assert_eq!(latencies.len(), 1);
        assert!(latencies[0] >= 0.0);
        assert!(observer.rounds.lock().is_empty());
    }

    #[tokio::test]
    async fn observer_hears_round_advances() {
        let mut node = solo_node();
        let observer = RecordingObserver::new();
        let silent = Keypair::generate().address();
        node.manager = node
            .manager
            .with_observer(Arc::clone(&observer) as Arc<dyn ConsensusObserver>)
            .with_selector(Box::new(crate::consensus::proposer::FixedSelector(silent)));

        node.manager.start_round().await.unwrap();
        node.manager.handle_timeout().await.unwrap();
        node.manager.pump(1).await.unwrap();

        // The expiry reports the real slot coordinates; nothing finalized.
        assert_eq!(*observer.rounds.lock(), vec![(1, 1)]);
        assert!(observer.latencies.lock().is_empty());
    }

    #[tokio::test]
    async fn proposal_is_deterministic_over_the_pool_snapshot() {
        let mut node = solo_node();
        for _ in 0..3 {
            let tx = funded_payment(&node, 1_000_000, 100);
            node.pool.add(tx).unwrap();
        }

        node.manager.start_round().await.unwrap();
        let blocks = node.manager.pump(1).await.unwrap();
        assert_eq!(blocks[0].transactions.len(), 3);
        assert_eq!(blocks[0].total_txs, 3);
        // Two proposer operations plus three single-operation payments.
        assert_eq!(blocks[0].total_ops, 5);
    }
}
