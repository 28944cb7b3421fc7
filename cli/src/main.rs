// Copyright (c) 2026 Tessera Labs. MIT License.
// See LICENSE for details.

//! # TESSERA Local Identity Agent
//!
//! Entry point for the `tessera` binary. Parses CLI arguments, initializes
//! logging, and drives the protocol crate against a file-backed network
//! directory shared between agents on the same machine.
//!
//! The binary supports six subcommands:
//!
//! - `init`    — create an identity and publish its genesis document
//! - `show`    — display the local identity and its delegate list
//! - `rotate`  — rotate recovery delegates, optionally broadcasting the anchor
//! - `assist`  — decrypt and hand back this identity's share of a target
//! - `recover` — rebuild a lost identity from collected shares
//! - `version` — print build version information

mod cli;
mod logging;
mod store;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use tessera_protocol::identity::controller::{Identity, IdentityController};
use tessera_protocol::identity::delegates;
use tessera_protocol::identity::sharing::RecoveryShare;
use tessera_protocol::identity::tessera_id::TesseraId;
use tessera_protocol::transport::memory::JsonAssertionEncoder;
use tessera_protocol::transport::AnchorTransactionBuilder;

use cli::{Commands, TesseraCli};
use logging::LogFormat;
use store::{FsLedger, FsStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TesseraCli::parse();
    logging::init_logging(
        "tessera=info,tessera_protocol=info",
        LogFormat::from_str_lossy(&cli.log_format),
    );

    match cli.command {
        Commands::Init(args) => init(args).await,
        Commands::Show(args) => show(args),
        Commands::Rotate(args) => rotate(args).await,
        Commands::Assist(args) => assist(args).await,
        Commands::Recover(args) => recover(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Wire a controller to the file-backed network directory.
fn controller_for(network_dir: &Path) -> Result<(IdentityController, FsLedger)> {
    let fs_store = FsStore::open(network_dir)?;
    let ledger = FsLedger::open(network_dir)?;
    let controller = IdentityController::new(
        Arc::new(fs_store.clone()),
        Arc::new(fs_store),
        Arc::new(ledger.clone()),
        Arc::new(JsonAssertionEncoder::new()),
    );
    Ok((controller, ledger))
}

/// Parse delegate identifier strings from the command line.
fn parse_delegates(raw: &[String]) -> Result<Vec<TesseraId>> {
    raw.iter()
        .map(|s| TesseraId::parse(s).with_context(|| format!("invalid delegate identifier '{s}'")))
        .collect()
}

async fn init(args: cli::InitArgs) -> Result<()> {
    let (controller, _) = controller_for(&args.network_dir)?;

    let delegate_ids = if args.delegates.is_empty() {
        None
    } else {
        Some(parse_delegates(&args.delegates)?)
    };

    let identity = controller
        .create(&args.name, delegate_ids.as_deref())
        .await?;
    store::save_state(&args.data_dir, &identity.to_local_state())?;

    println!("{}", identity.id());
    if delegate_ids.is_some() {
        eprintln!("recovery network published; any 2 of 3 delegates can restore this identity");
    } else {
        eprintln!("no recovery network: losing {} is permanent", args.data_dir.display());
    }
    Ok(())
}

fn show(args: cli::ShowArgs) -> Result<()> {
    let state = store::load_state(&args.data_dir)?;
    let identity = Identity::from_local_state(&state)?;
    let document = identity.document();

    println!("identifier:      {}", identity.id());
    println!("document:        v{} @ {}", document.version, identity.content_address());
    if let Some(profile) = &document.public_profile {
        println!("profile:         {}", profile.name);
    }
    match &document.encrypted_delegates {
        Some(encrypted) => {
            let list = delegates::decrypt_list(identity.keyring(), encrypted)?;
            println!("delegates:");
            for (slot, id) in list.iter().enumerate() {
                println!("  [{}] {}", slot + 1, id);
            }
        }
        None => println!("delegates:       none (no recovery network)"),
    }
    Ok(())
}

async fn rotate(args: cli::RotateArgs) -> Result<()> {
    let (controller, ledger) = controller_for(&args.network_dir)?;
    let state = store::load_state(&args.data_dir)?;
    let mut identity = Identity::from_local_state(&state)?;

    let new_ids = parse_delegates(&args.delegates)?;
    let pending = controller.update_delegates(&mut identity, &new_ids).await?;
    store::save_state(&args.data_dir, &identity.to_local_state())?;

    eprintln!(
        "document v{} published; anchor tx {} (estimated fee: {} units)",
        identity.document().version,
        pending.tx.id,
        pending.cost.fee
    );

    if args.broadcast {
        let receipt = ledger.broadcast(&pending.tx).await?;
        eprintln!("anchored at ledger position {}", receipt.position);
    } else {
        // Print the signed transaction for explicit submission later.
        println!("{}", serde_json::to_string_pretty(&pending.tx)?);
        eprintln!("transaction NOT broadcast; submit it to move resolution forward");
    }
    Ok(())
}

async fn assist(args: cli::AssistArgs) -> Result<()> {
    let (controller, _) = controller_for(&args.network_dir)?;
    let state = store::load_state(&args.data_dir)?;
    let identity = Identity::from_local_state(&state)?;

    let target = TesseraId::parse(&args.target).context("invalid target identifier")?;
    let share = controller.assist_recovery(&identity, &target).await?;

    // Share JSON on stdout; the delegate relays it out-of-band.
    println!("{}", serde_json::to_string_pretty(&share)?);
    eprintln!(
        "share {} decrypted for {}; deliver it to the recovering party over a trusted channel",
        share.index, target
    );
    Ok(())
}

async fn recover(args: cli::RecoverArgs) -> Result<()> {
    let (controller, _) = controller_for(&args.network_dir)?;
    let target = TesseraId::parse(&args.target).context("invalid target identifier")?;

    let mut session = controller.begin_recovery(&target).await?;
    for path in &args.shares {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading share file {}", path.display()))?;
        let share: RecoveryShare = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing share file {}", path.display()))?;
        session.add_share(share);
    }

    match session.attempt() {
        Ok(identity) => {
            store::save_state(&args.data_dir, &identity.to_local_state())?;
            println!("{}", identity.id());
            eprintln!("identity recovered into {}", args.data_dir.display());
            Ok(())
        }
        Err(e) if e.is_retryable_recovery() => {
            bail!("not enough shares yet ({}): collect more and retry", e)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_version() {
    println!("tessera {}", env!("CARGO_PKG_VERSION"));
    println!("protocol library: tessera-protocol {}", env!("CARGO_PKG_VERSION"));
}
