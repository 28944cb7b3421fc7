//! # CLI Interface
//!
//! Command-line argument structure for the `tessera` local identity agent,
//! built with `clap` derive.
//!
//! The agent keeps two directories apart on purpose:
//!
//! - the **data directory** holds one identity's private local state
//!   (identifier, latest document, raw key material);
//! - the **network directory** simulates the shared world — the content
//!   store and the anchoring ledger — so several agents on one machine can
//!   act as each other's delegates.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TESSERA local identity agent.
///
/// Creates and maintains a decentralized identity with social key
/// recovery: three delegates hold sealed shares of the master secret, any
/// two of which can bring the identity back after total key loss.
#[derive(Parser, Debug)]
#[command(
    name = "tessera",
    about = "TESSERA decentralized identity agent",
    version,
    propagate_version = true
)]
pub struct TesseraCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "TESSERA_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: String,
}

/// Top-level subcommands for the agent.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new identity and publish its genesis document.
    Init(InitArgs),
    /// Display the local identity, including the decrypted delegate list.
    Show(ShowArgs),
    /// Rotate the recovery delegates and produce a signed anchor transaction.
    Rotate(RotateArgs),
    /// Help another identity recover: locate and decrypt this identity's
    /// share of their secret.
    Assist(AssistArgs),
    /// Rebuild a lost identity from delegate-returned shares.
    Recover(RecoverArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory for this identity's private local state.
    #[arg(long, short = 'd', env = "TESSERA_DATA_DIR", default_value = ".tessera")]
    pub data_dir: PathBuf,

    /// Shared network directory (content store + ledger).
    #[arg(long, short = 'n', env = "TESSERA_NETWORK_DIR", default_value = ".tessera-net")]
    pub network_dir: PathBuf,

    /// Public display name for the identity.
    #[arg(long)]
    pub name: String,

    /// Exactly three delegate identifiers (did:tessera:...). Omit to create
    /// an identity without a recovery network.
    #[arg(long = "delegate", num_args = 1)]
    pub delegates: Vec<String>,
}

/// Arguments for the `show` subcommand.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Directory holding the identity's local state.
    #[arg(long, short = 'd', env = "TESSERA_DATA_DIR", default_value = ".tessera")]
    pub data_dir: PathBuf,
}

/// Arguments for the `rotate` subcommand.
#[derive(Parser, Debug)]
pub struct RotateArgs {
    /// Directory holding the identity's local state.
    #[arg(long, short = 'd', env = "TESSERA_DATA_DIR", default_value = ".tessera")]
    pub data_dir: PathBuf,

    /// Shared network directory (content store + ledger).
    #[arg(long, short = 'n', env = "TESSERA_NETWORK_DIR", default_value = ".tessera-net")]
    pub network_dir: PathBuf,

    /// Exactly three new delegate identifiers.
    #[arg(long = "delegate", num_args = 1, required = true)]
    pub delegates: Vec<String>,

    /// Broadcast the anchor transaction immediately instead of printing it
    /// for later submission.
    #[arg(long)]
    pub broadcast: bool,
}

/// Arguments for the `assist` subcommand.
#[derive(Parser, Debug)]
pub struct AssistArgs {
    /// Directory holding the assisting identity's local state.
    #[arg(long, short = 'd', env = "TESSERA_DATA_DIR", default_value = ".tessera")]
    pub data_dir: PathBuf,

    /// Shared network directory (content store + ledger).
    #[arg(long, short = 'n', env = "TESSERA_NETWORK_DIR", default_value = ".tessera-net")]
    pub network_dir: PathBuf,

    /// Identifier of the identity being recovered.
    #[arg(long)]
    pub target: String,
}

/// Arguments for the `recover` subcommand.
#[derive(Parser, Debug)]
pub struct RecoverArgs {
    /// Directory where the recovered identity's state will be written.
    #[arg(long, short = 'd', env = "TESSERA_DATA_DIR", default_value = ".tessera")]
    pub data_dir: PathBuf,

    /// Shared network directory (content store + ledger).
    #[arg(long, short = 'n', env = "TESSERA_NETWORK_DIR", default_value = ".tessera-net")]
    pub network_dir: PathBuf,

    /// Identifier of the lost identity.
    #[arg(long)]
    pub target: String,

    /// Share files produced by delegates running `assist`. At least two.
    #[arg(long = "share", num_args = 1, required = true)]
    pub shares: Vec<PathBuf>,
}
