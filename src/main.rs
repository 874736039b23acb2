//! identity-anchor CLI
//!
//! Hash an agent's identity documents, publish them through an ERC-8004
//! registration, and verify a workspace against what was published.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use alloy::primitives::B256;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use identity_anchor::chain::{ChainClient, DEFAULT_SALT};
use identity_anchor::config::{AgentConfig, ChainSettings, default_documents, validate_documents};
use identity_anchor::identity::compute_snapshot;
use identity_anchor::workflow::{
    Handoff, UpdatePlan, VerifyOutcome, exit_code as verify_exit_code, plan_update, submit,
    verify_offline, verify_online, write_artifacts, write_handoff,
};
use identity_anchor::workspace::Workspace;

#[derive(Parser)]
#[command(name = "identity-anchor", version, about)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    chain: ChainArgs,

    #[command(subcommand)]
    command: Command,
}

/// Chain overrides. Unset values fall back to the config file, then to defaults.
#[derive(Args)]
struct ChainArgs {
    #[arg(long, global = true, env = "IDENTITY_ANCHOR_RPC_URL")]
    rpc_url: Option<String>,

    #[arg(long, global = true, env = "IDENTITY_ANCHOR_CHAIN_ID")]
    chain_id: Option<u64>,

    #[arg(long, global = true, env = "IDENTITY_ANCHOR_IDENTITY_REGISTRY")]
    identity_registry: Option<String>,

    #[arg(long, global = true, env = "IDENTITY_ANCHOR_TBA_REGISTRY")]
    tba_registry: Option<String>,

    #[arg(long, global = true, env = "IDENTITY_ANCHOR_TBA_IMPLEMENTATION")]
    tba_implementation: Option<String>,

    #[arg(long, global = true, env = "IDENTITY_ANCHOR_IPFS_GATEWAY")]
    ipfs_gateway: Option<String>,

    /// Timeout for every RPC and HTTP call, in seconds.
    #[arg(long, global = true, env = "IDENTITY_ANCHOR_TIMEOUT")]
    timeout: Option<u64>,
}

impl ChainArgs {
    fn apply(&self, mut settings: ChainSettings) -> ChainSettings {
        if let Some(v) = &self.rpc_url {
            settings.rpc_url = v.clone();
        }
        if let Some(v) = self.chain_id {
            settings.chain_id = v;
        }
        if let Some(v) = &self.identity_registry {
            settings.identity_registry = v.clone();
        }
        if let Some(v) = &self.tba_registry {
            settings.tba_registry = v.clone();
        }
        if let Some(v) = &self.tba_implementation {
            settings.tba_implementation = v.clone();
        }
        if let Some(v) = &self.ipfs_gateway {
            settings.ipfs_gateway = v.clone();
        }
        if let Some(v) = self.timeout {
            settings.request_timeout_secs = v;
        }
        settings
    }

    fn client(&self, base: ChainSettings) -> anyhow::Result<ChainClient> {
        let config = self.apply(base).resolve()?;
        tracing::debug!("Using chain {} via {}", config.chain_id, config.rpc_url);
        Ok(ChainClient::connect(config))
    }
}

#[derive(Args)]
struct DocumentArgs {
    /// Workspace directory holding the identity documents.
    #[arg(long, env = "IDENTITY_ANCHOR_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Ordered, comma-separated document names.
    #[arg(long, value_delimiter = ',')]
    documents: Option<Vec<String>>,
}

impl DocumentArgs {
    fn resolve(&self) -> anyhow::Result<(Workspace, Vec<String>)> {
        let documents = self.documents.clone().unwrap_or_else(default_documents);
        validate_documents(&documents)?;
        Ok((Workspace::open(&self.workspace)?, documents))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show an agent's on-chain registration.
    Lookup { agent_id: u64 },

    /// Show an agent's token-bound account.
    Tba {
        agent_id: u64,

        /// 32-byte hex salt.
        #[arg(long)]
        salt: Option<String>,

        /// Derive the address locally without contacting a node.
        #[arg(long)]
        offline: bool,
    },

    /// Hash the workspace documents and print them as a hash file.
    Hash {
        #[command(flatten)]
        docs: DocumentArgs,

        /// Write the hash file here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check the workspace against on-chain (or offline) hashes.
    Verify {
        #[command(flatten)]
        docs: DocumentArgs,

        #[arg(long, env = "IDENTITY_ANCHOR_AGENT_ID")]
        agent_id: Option<u64>,

        /// Compare against this hash file instead of the chain.
        #[arg(long)]
        hash_file: Option<PathBuf>,

        /// Treat documents without a recorded hash as failures.
        #[arg(long)]
        strict: bool,

        #[arg(long)]
        json: bool,
    },

    /// Build a new registration when the workspace has drifted.
    Update {
        #[arg(long)]
        config: PathBuf,

        /// Write registration.json, registration.uri and snapshot.json here.
        #[arg(long, value_name = "DIR")]
        dry_run: Option<PathBuf>,

        /// Write the signer handoff file here.
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Submit through a configured signer.
        #[arg(long)]
        sign: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("error: {e:#}");
            ExitCode::from(VerifyOutcome::EXIT_ERROR as u8)
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("identity_anchor=info"));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Command::Lookup { agent_id } => {
            let client = cli.chain.client(ChainSettings::default())?;
            let agent = client.lookup_agent(agent_id).await?;
            print_json(&agent)?;
            Ok(0)
        }

        Command::Tba {
            agent_id,
            salt,
            offline,
        } => {
            let salt = match salt {
                Some(s) => B256::from_str(&s).with_context(|| format!("invalid salt {s}"))?,
                None => DEFAULT_SALT,
            };
            let client = cli.chain.client(ChainSettings::default())?;
            let status = if offline {
                serde_json::json!({
                    "address": client.derive_tba_address(agent_id, salt).to_checksum(None),
                    "exists": null,
                })
            } else {
                serde_json::to_value(client.tba_status(agent_id, salt).await?)?
            };
            print_json(&status)?;
            Ok(0)
        }

        Command::Hash { docs, output } => {
            let (workspace, documents) = docs.resolve()?;
            let snapshot = compute_snapshot(&workspace, &documents)?;
            for name in snapshot.missing() {
                tracing::warn!("Document {} is missing", name);
            }
            let files = snapshot.to_identity_files(chrono::Utc::now().to_rfc3339());
            let json = serde_json::to_string_pretty(&files)?;
            match output {
                Some(path) => write_file(&path, &json)?,
                None => println!("{json}"),
            }
            Ok(0)
        }

        Command::Verify {
            docs,
            agent_id,
            hash_file,
            strict,
            json,
        } => {
            let (workspace, documents) = docs.resolve()?;
            let result = match hash_file {
                Some(path) => verify_offline(&workspace, &documents, &path, strict),
                None => {
                    let client = cli.chain.client(ChainSettings::default())?;
                    verify_online(&workspace, &documents, &client, agent_id, strict).await
                }
            };

            match &result {
                Ok(outcome) if json => print_json(outcome)?,
                Ok(outcome) => println!("{}", outcome.render()),
                Err(e) => {
                    tracing::error!("Verification could not run: {}", e);
                    eprintln!("error: {e}");
                }
            }
            Ok(verify_exit_code(&result) as u8)
        }

        Command::Update {
            config,
            dry_run,
            output,
            sign,
        } => {
            let agent = AgentConfig::load(&config)?;
            let workspace = agent.require_workspace()?;
            let client = cli.chain.client(agent.chain.clone())?;
            let plan = plan_update(&agent, &workspace, &client).await?;

            if let Some(dir) = &dry_run {
                for path in write_artifacts(&plan, dir)? {
                    println!("wrote {}", path.display());
                }
            }

            let publication = match &plan {
                UpdatePlan::UpToDate { agent_id, .. } => {
                    println!("agent {agent_id} is up to date; no transaction needed");
                    return Ok(0);
                }
                UpdatePlan::Publish(p) => p,
            };

            for diff in &publication.diffs {
                println!(
                    "changed {}: {} -> {}",
                    diff.name,
                    diff.on_chain.as_deref().unwrap_or("none"),
                    diff.local.as_deref().unwrap_or("none")
                );
            }

            if let Some(path) = &output {
                write_handoff(publication, path)?;
                println!("handoff written to {}", path.display());
            }

            if sign {
                let tx_hash = submit(publication, None).await?;
                println!("submitted {tx_hash}");
            } else if output.is_none() && dry_run.is_none() {
                print_json(&Handoff::from_publication(publication))?;
            }
            Ok(0)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
