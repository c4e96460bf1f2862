// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ISAAC Validator Node
//!
//! Entry point for the `isaac-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires the consensus machinery, and
//! runs the state manager until shutdown.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the validator node
//! - `init`    — initialize data directory and generate keys
//! - `version` — print build version information
//!
//! The network transport is a deployment concern: peers deliver ballots
//! into the node's intake queue and the node broadcasts through the
//! `BallotSender` seam. This binary ships with the single-validator
//! development wiring; multi-validator transports plug into the same
//! seams.

mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use axum::routing::get;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use isaac_protocol::common::Amount;
use isaac_protocol::config::Config;
use isaac_protocol::consensus::{Isaac, StateManager};
use isaac_protocol::crypto::keys::Keypair;
use isaac_protocol::network::{BallotQueue, NullFetcher, NullSender, TransactionPool};
use isaac_protocol::storage::Storage;

use cli::{Commands, IsaacNodeCli, RunArgs};
use logging::LogFormat;
use metrics::{metrics_handler, NodeMetrics, SharedMetrics};

/// File under the data directory holding the hex-encoded validator key.
const KEY_FILE: &str = "validator.key";

/// File under the data directory pinning the dev common account address.
const DEV_COMMON_ACCOUNT_FILE: &str = "common_account";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = IsaacNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            println!("isaac-node {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run — Full validator startup sequence
// ---------------------------------------------------------------------------

/// Starts the validator: metrics endpoint plus consensus participation.
///
/// Startup sequence:
/// 1. Resolve paths and initialize logging
/// 2. Load or generate the validator keypair
/// 3. Assemble the protocol configuration
/// 4. Open storage and bootstrap genesis if empty
/// 5. Build pool, queue, and the state manager
/// 6. Serve Prometheus metrics
/// 7. Run consensus until ctrl-c
async fn run_node(args: RunArgs) -> Result<()> {
    let data_dir = cli::resolve_data_dir(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    logging::init_logging(
        &format!(
            "isaac_node={level},isaac_protocol={level}",
            level = args.log_level
        ),
        LogFormat::from_str_lossy(&args.log_format),
    );

    let keypair = load_or_create_keypair(&data_dir, args.validator_key.as_deref(), args.dev)?;
    info!(address = %keypair.address(), "validator identity loaded");

    let config = assemble_config(&args, &keypair, &data_dir)?;
    info!(
        validators = config.validators.len(),
        quorum = config.quorum(),
        "consensus configuration assembled"
    );

    // Storage and genesis bootstrap.
    let genesis_account = args
        .genesis_account
        .clone()
        .unwrap_or_else(|| keypair.address());
    let storage = Storage::open(data_dir.join("db"))?;
    let latest = storage.bootstrap(
        &genesis_account,
        config.initial_balance,
        &config.common_account_address,
    )?;
    info!(height = latest.height, hash = %latest.hash, "chain opened");

    // Consensus wiring.
    let pool = Arc::new(TransactionPool::new(
        isaac_protocol::config::DEFAULT_POOL_CAPACITY,
    ));
    let queue = Arc::new(BallotQueue::new(
        isaac_protocol::config::DEFAULT_BALLOT_QUEUE_CAPACITY,
    ));
    let node_metrics: SharedMetrics = Arc::new(NodeMetrics::new());

    let observer: Arc<dyn isaac_protocol::observer::ConsensusObserver> = node_metrics.clone();
    let isaac = Isaac::new(config.clone(), latest);
    let mut manager = StateManager::new(
        config,
        keypair,
        isaac,
        storage,
        pool,
        Arc::clone(&queue),
        Arc::new(NullSender),
        Arc::new(NullFetcher),
    )
    .with_observer(observer);

    // Metrics endpoint.
    serve_metrics(node_metrics, args.metrics_port).await?;

    // Shutdown on ctrl-c.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    manager.run(shutdown_rx).await?;
    Ok(())
}

/// Builds the protocol [`Config`] from CLI arguments.
fn assemble_config(args: &RunArgs, keypair: &Keypair, data_dir: &Path) -> Result<Config> {
    let mut validators = args.validators.clone();
    validators.retain(|v| !v.is_empty());

    if validators.is_empty() {
        if !args.dev {
            bail!("--validators is required outside --dev mode");
        }
        validators = vec![keypair.address()];
    }

    let common_account = match &args.common_account {
        Some(address) => address.clone(),
        None if args.dev => dev_common_account(data_dir)?,
        None => bail!("--common-account is required outside --dev mode"),
    };

    Ok(Config {
        network_id: args.network_id.as_bytes().to_vec(),
        validators,
        common_account_address: common_account,
        initial_balance: Amount::new(args.initial_balance),
        txs_limit: args.txs_limit,
        ops_limit: args.ops_limit,
        timeout_init: Duration::from_millis(args.timeout_init_ms),
        timeout_sign: Duration::from_millis(args.timeout_sign_ms),
        timeout_accept: Duration::from_millis(args.timeout_accept_ms),
        block_height_end_of_inflation: args.block_height_end_of_inflation,
        ..Config::default()
    })
}

/// Loads the validator key from the CLI flag or the key file; in dev
/// mode a missing key is generated and persisted.
fn load_or_create_keypair(
    data_dir: &Path,
    flag: Option<&str>,
    dev: bool,
) -> Result<Keypair> {
    if let Some(hex_key) = flag {
        return Keypair::from_hex(hex_key.trim()).context("parsing --validator-key");
    }

    let key_path = data_dir.join(KEY_FILE);
    if key_path.exists() {
        let hex_key = std::fs::read_to_string(&key_path)
            .with_context(|| format!("reading {}", key_path.display()))?;
        return Keypair::from_hex(hex_key.trim())
            .with_context(|| format!("parsing {}", key_path.display()));
    }

    if !dev {
        bail!(
            "no validator key: pass --validator-key or run `isaac-node init -d {}`",
            data_dir.display()
        );
    }

    let keypair = Keypair::generate();
    write_key_file(&key_path, &keypair)?;
    info!(path = %key_path.display(), "generated dev validator key");
    Ok(keypair)
}

/// The dev-mode common account: generated once, pinned in the data
/// directory so restarts keep the same chain.
fn dev_common_account(data_dir: &Path) -> Result<String> {
    let path = data_dir.join(DEV_COMMON_ACCOUNT_FILE);
    if path.exists() {
        return Ok(std::fs::read_to_string(&path)?.trim().to_string());
    }
    let address = Keypair::generate().address();
    std::fs::write(&path, &address)?;
    Ok(address)
}

fn write_key_file(path: &Path, keypair: &Keypair) -> Result<()> {
    std::fs::write(path, hex::encode(keypair.to_bytes()))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

async fn serve_metrics(metrics: SharedMetrics, port: u16) -> Result<()> {
    let app = axum::Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding metrics port {}", port))?;
    info!(port, "metrics endpoint listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server failed");
        }
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// init — Data directory bootstrap
// ---------------------------------------------------------------------------

/// Creates the data directory and a fresh validator keypair.
fn init_node(args: cli::InitArgs) -> Result<()> {
    let data_dir = cli::resolve_data_dir(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let key_path = data_dir.join(KEY_FILE);
    if key_path.exists() {
        bail!("{} already exists, refusing to overwrite", key_path.display());
    }

    let keypair = Keypair::generate();
    write_key_file(&key_path, &keypair)?;

    println!("data directory: {}", data_dir.display());
    println!("validator key:  {}", key_path.display());
    println!("address:        {}", keypair.address());
    Ok(())
}
