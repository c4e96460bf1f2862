//! # CLI Interface
//!
//! Defines the command-line argument structure for `isaac-node` using
//! `clap` derive. Supports three subcommands: `run`, `init`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// ISAAC Protocol validator node.
///
/// A validator node for an ISAAC BFT network. Participates in consensus,
/// validates ballots, finalizes blocks, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "isaac-node",
    about = "ISAAC Protocol validator node",
    version,
    propagate_version = true
)]
pub struct IsaacNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the validator node.
    Run(RunArgs),
    /// Initialize a new node — creates the data directory and generates
    /// a fresh validator keypair.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where blocks, accounts, and keys
    /// are stored. Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "ISAAC_DATA_DIR", default_value = "~/.isaac")]
    pub data_dir: PathBuf,

    /// Network identifier mixed into every signature.
    #[arg(long, env = "ISAAC_NETWORK_ID", default_value = "isaac-main-net")]
    pub network_id: String,

    /// Comma-separated validator addresses, the local node included.
    ///
    /// May be empty only with `--dev`, which runs a single-validator
    /// network out of the local keypair.
    #[arg(long, env = "ISAAC_VALIDATORS", value_delimiter = ',')]
    pub validators: Vec<String>,

    /// Address of the common account receiving fees and inflation.
    #[arg(long, env = "ISAAC_COMMON_ACCOUNT")]
    pub common_account: Option<String>,

    /// Address of the genesis account holding the initial balance.
    #[arg(long, env = "ISAAC_GENESIS_ACCOUNT")]
    pub genesis_account: Option<String>,

    /// Initial balance of the genesis account, in base units. Also the
    /// input of the inflation formula.
    #[arg(long, env = "ISAAC_INITIAL_BALANCE", default_value_t = 10_000_000_000_000_000)]
    pub initial_balance: u64,

    /// Per-block cap on included transactions.
    #[arg(long, default_value_t = 1_000)]
    pub txs_limit: usize,

    /// Per-block cap on operations.
    #[arg(long, default_value_t = 10_000)]
    pub ops_limit: usize,

    /// INIT phase timeout in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    pub timeout_init_ms: u64,

    /// SIGN phase timeout in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    pub timeout_sign_ms: u64,

    /// ACCEPT phase timeout in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    pub timeout_accept_ms: u64,

    /// Block height after which inflation stops.
    #[arg(long, default_value_t = 36_000_000)]
    pub block_height_end_of_inflation: u64,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ISAAC_METRICS_PORT", default_value_t = 9742)]
    pub metrics_port: u16,

    /// Hex-encoded Ed25519 validator private key.
    ///
    /// If not provided, the node reads the key from the data directory.
    /// Never pass this flag in production — use the key file.
    #[arg(long, env = "ISAAC_VALIDATOR_KEY")]
    pub validator_key: Option<String>,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Single-validator development mode: generates any missing accounts
    /// and runs a one-node network.
    #[arg(long)]
    pub dev: bool,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "ISAAC_DATA_DIR", default_value = "~/.isaac")]
    pub data_dir: PathBuf,
}

/// Expands a leading `~` to the user's home directory.
pub fn resolve_data_dir(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
