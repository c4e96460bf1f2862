//! # Prometheus Metrics
//!
//! Operational metrics for the validator node, scraped at the `/metrics`
//! HTTP endpoint on the configured metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do
//! not collide with any default global registry consumers. The struct
//! doubles as the protocol's [`ConsensusObserver`] — the consensus
//! machinery reports events, the handles count them.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

use isaac_protocol::common::Amount;
use isaac_protocol::observer::ConsensusObserver;
use isaac_protocol::voting::{BallotState, Basis, VotingHole};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of blocks finalized by this node.
    pub blocks_finalized_total: IntCounter,
    /// Total number of transactions included in finalized blocks.
    pub transactions_processed_total: IntCounter,
    /// Total number of ballots accepted into a tally.
    pub ballots_tallied_total: IntCounter,
    /// Total number of inbound ballots dropped before tallying.
    pub ballots_dropped_total: IntCounter,
    /// Total number of abandoned rounds.
    pub rounds_abandoned_total: IntCounter,
    /// Total number of phase threshold decisions.
    pub decisions_total: IntCounter,
    /// Height of the latest finalized block.
    pub block_height: IntGauge,
    /// Round number of the slot currently being decided.
    pub current_round: IntGauge,
    /// Ballots dropped by queue backpressure since start.
    pub queue_dropped: IntGauge,
    /// Histogram of INIT-open-to-commit latency in seconds.
    pub finalize_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("isaac".into()), None)
            .expect("failed to create prometheus registry");

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let counter = IntCounter::new(name, help).expect("metric creation");
            registry
                .register(Box::new(counter.clone()))
                .expect("metric registration");
            counter
        }
        fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
            let gauge = IntGauge::new(name, help).expect("metric creation");
            registry
                .register(Box::new(gauge.clone()))
                .expect("metric registration");
            gauge
        }

        let blocks_finalized_total = counter(
            &registry,
            "blocks_finalized_total",
            "Total number of finalized blocks",
        );
        let transactions_processed_total = counter(
            &registry,
            "transactions_processed_total",
            "Total number of transactions included in finalized blocks",
        );
        let ballots_tallied_total = counter(
            &registry,
            "ballots_tallied_total",
            "Total number of ballots accepted into a tally",
        );
        let ballots_dropped_total = counter(
            &registry,
            "ballots_dropped_total",
            "Total number of inbound ballots dropped before tallying",
        );
        let rounds_abandoned_total = counter(
            &registry,
            "rounds_abandoned_total",
            "Total number of rounds abandoned on NO or EXPIRED quorum",
        );
        let decisions_total = counter(
            &registry,
            "decisions_total",
            "Total number of phase threshold decisions",
        );
        let block_height = gauge(
            &registry,
            "block_height",
            "Height of the latest finalized block",
        );
        let current_round = gauge(
            &registry,
            "current_round",
            "Round number of the slot currently being decided",
        );
        let queue_dropped = gauge(
            &registry,
            "queue_dropped",
            "Ballots dropped by inbound queue backpressure",
        );

        let finalize_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "finalize_latency_seconds",
                "Seconds from a round's INIT open to its block commit",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(finalize_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            blocks_finalized_total,
            transactions_processed_total,
            ballots_tallied_total,
            ballots_dropped_total,
            rounds_abandoned_total,
            decisions_total,
            block_height,
            current_round,
            queue_dropped,
            finalize_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsensusObserver for NodeMetrics {
    fn ballot_dropped(&self, _reason: &str) {
        self.ballots_dropped_total.inc();
    }

    fn ballot_tallied(&self, _state: BallotState, _vote: VotingHole) {
        self.ballots_tallied_total.inc();
    }

    fn decision_reached(&self, _basis: &Basis, _state: BallotState, _vote: VotingHole) {
        self.decisions_total.inc();
    }

    fn round_advanced(&self, _height: u64, round: u32) {
        self.rounds_abandoned_total.inc();
        self.current_round.set(round as i64);
    }

    fn block_finalized(
        &self,
        height: u64,
        transactions: usize,
        _operations: usize,
        _fees: Amount,
        _inflation: Amount,
    ) {
        self.blocks_finalized_total.inc();
        self.transactions_processed_total.inc_by(transactions as u64);
        self.block_height.set(height as i64);
        // The next slot opens at round 0.
        self.current_round.set(0);
    }

    fn finalize_latency(&self, seconds: f64) {
        self.finalize_latency_seconds.observe(seconds);
    }

    fn queue_dropped_total(&self, dropped: u64) {
        self.queue_dropped.set(dropped as i64);
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
