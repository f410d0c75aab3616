//! `agent-ledger` inspection CLI.
//!
//! Reads a file-backed ledger and derives record keys. It never signs or
//! mutates anything.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use agent_ledger::config::{LogConfig, StoreBackend};
use agent_ledger::reputation::AgentReputation;
use agent_ledger::{
    AgentId, AgentIdentity, AnyStore, KeyedStore, Ledger, LedgerConfig, SignerId, SignerNonce,
    TaskHash, ValidationRecord, WalletLink, task_hash,
};

#[derive(Parser, Debug)]
#[command(name = "agent-ledger", version, about = "Inspect an agent identity ledger")]
struct Cli {
    /// Config file (default: ~/.agent-ledger/config.toml).
    #[arg(long, env = "AGENT_LEDGER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Ledger snapshot, overriding the configured store path.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show an identity by owner or by agent id.
    Identity {
        #[arg(long, conflicts_with = "agent_id", required_unless_present = "agent_id")]
        owner: Option<SignerId>,
        #[arg(long)]
        agent_id: Option<AgentId>,
    },
    /// Show the wallet link and the identity a wallet resolves to.
    Resolve { wallet: SignerId },
    /// Show the reputation aggregate of an identity.
    Reputation { agent_id: AgentId },
    /// Show the validation record for a task.
    Validation {
        agent_id: AgentId,
        task_hash: TaskHash,
    },
    /// Show the next request nonce a signer must use.
    Nonce { signer: SignerId },
    /// Derive a record key without touching the store.
    Keys {
        #[command(subcommand)]
        record: KeyCommand,
    },
    /// SHA-256 task hash of a string.
    TaskHash { content: String },
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    Agent { owner: SignerId },
    Wallet { wallet: SignerId },
    Reputation { agent_id: AgentId },
    Validation {
        agent_id: AgentId,
        task_hash: TaskHash,
    },
    Nonce { signer: SignerId },
}

#[derive(Serialize)]
struct Resolution {
    link: WalletLink,
    identity: AgentIdentity,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        LedgerConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.log);

    match &cli.command {
        Command::Keys { record } => {
            let key = match record {
                KeyCommand::Agent { owner } => AgentIdentity::key_for(owner),
                KeyCommand::Wallet { wallet } => WalletLink::key_for(wallet),
                KeyCommand::Reputation { agent_id } => AgentReputation::key_for(agent_id),
                KeyCommand::Validation {
                    agent_id,
                    task_hash,
                } => ValidationRecord::key_for(agent_id, task_hash),
                KeyCommand::Nonce { signer } => SignerNonce::key_for(signer),
            };
            println!("{key}");
            return Ok(());
        }
        Command::TaskHash { content } => {
            println!("{}", task_hash(content));
            return Ok(());
        }
        _ => {}
    }

    // Inspection only makes sense against persisted state.
    config.store.backend = StoreBackend::File;
    if let Some(path) = cli.store {
        config.store.path = Some(path);
    }
    let path = config.store.resolved_path();
    if !path.exists() {
        anyhow::bail!("no ledger snapshot at {}", path.display());
    }

    let ledger = Ledger::open(&config)
        .with_context(|| format!("failed to open ledger at {}", path.display()))?;
    tracing::debug!(path = %path.display(), records = ledger.store().len(), "Opened ledger");

    run(&ledger, cli.command)
}

fn run(ledger: &Ledger<AnyStore>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Identity { owner, agent_id } => {
            let identity = match (owner, agent_id) {
                (Some(owner), _) => ledger.identity_by_owner(&owner)?,
                (None, Some(agent_id)) => ledger.identity(&agent_id)?,
                (None, None) => anyhow::bail!("pass --owner or --agent-id"),
            };
            print_json(&identity)
        }
        Command::Resolve { wallet } => {
            let (link, identity) = ledger.resolve_link(&wallet)?;
            print_json(&Resolution { link, identity })
        }
        Command::Reputation { agent_id } => match ledger.reputation(&agent_id)? {
            Some(reputation) => print_json(&reputation),
            None => {
                println!("no feedback recorded for {agent_id}");
                Ok(())
            }
        },
        Command::Validation {
            agent_id,
            task_hash,
        } => print_json(&ledger.validation(&agent_id, &task_hash)?),
        Command::Nonce { signer } => {
            println!("{}", ledger.nonce(&signer)?);
            Ok(())
        }
        Command::Keys { .. } | Command::TaskHash { .. } => Ok(()),
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
