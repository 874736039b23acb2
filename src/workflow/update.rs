//! Republishing identity hashes when the workspace drifts from the chain.
//!
//! # Flow
//!
//! ```text
//! snapshot ─→ agent_id? ──no──→ Register (first registration)
//!                 │yes
//!                 ▼
//!       on-chain identityFiles ─→ diff ─→ empty ──→ UpToDate (no tx built)
//!                                    └──→ changes → UpdateUri
//! ```
//!
//! A publication can leave the process three ways, in any combination:
//! artifacts on disk for inspection, a handoff file for an external signer,
//! or direct submission through a [`TransactionSigner`]. Submission without
//! a signer fails loudly.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::{ChainClient, RegistryBackend, UnsignedTransaction};
use crate::config::AgentConfig;
use crate::error::{ConfigError, SignerError, UpdateError};
use crate::identity::hashing::{IdentityFiles, IdentitySnapshot, compute_snapshot, hashes_equal};
use crate::identity::registration::{
    CostEstimate, RegistrationDocument, build_registration, encode_data_uri, estimate_uri_cost,
};
use crate::workflow::atomic_write;
use crate::workspace::DocumentStore;

/// Name used for the composite entry in diffs.
pub const COMPOSITE: &str = "composite";

/// External signing capability. Implementations own all key material.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Sign and broadcast `tx` on `chain_id`, returning the transaction hash.
    async fn sign_and_send(
        &self,
        chain_id: u64,
        tx: &UnsignedTransaction,
    ) -> Result<String, SignerError>;
}

/// One hash that differs between workspace and chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashDiff {
    pub name: String,
    pub local: Option<String>,
    pub on_chain: Option<String>,
}

/// Kind of transaction a publication needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishKind {
    Register,
    UpdateUri { agent_id: u64 },
}

/// A new registration ready to be signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub kind: PublishKind,
    pub chain_id: u64,
    pub snapshot: IdentitySnapshot,
    pub diffs: Vec<HashDiff>,
    pub document: RegistrationDocument,
    pub data_uri: String,
    pub transaction: UnsignedTransaction,
    pub cost_estimate: CostEstimate,
}

/// Outcome of planning an update.
#[derive(Debug, Clone)]
pub enum UpdatePlan {
    /// On-chain hashes already match the workspace.
    UpToDate {
        agent_id: u64,
        snapshot: IdentitySnapshot,
    },
    Publish(Box<Publication>),
}

impl UpdatePlan {
    pub fn snapshot(&self) -> &IdentitySnapshot {
        match self {
            Self::UpToDate { snapshot, .. } => snapshot,
            Self::Publish(p) => &p.snapshot,
        }
    }

    pub fn publication(&self) -> Option<&Publication> {
        match self {
            Self::UpToDate { .. } => None,
            Self::Publish(p) => Some(p.as_ref()),
        }
    }
}

/// Hashes that differ between the local snapshot and `on_chain`.
///
/// A missing on-chain set makes every present local hash a difference.
/// Documents recorded on-chain but no longer configured locally count too.
pub fn diff_hashes(snapshot: &IdentitySnapshot, on_chain: Option<&IdentityFiles>) -> Vec<HashDiff> {
    let same = |a: Option<&str>, b: Option<&str>| match (a, b) {
        (Some(a), Some(b)) => hashes_equal(a, b),
        (None, None) => true,
        _ => false,
    };

    let mut diffs = Vec::new();
    for doc in &snapshot.documents {
        let remote = on_chain.and_then(|f| f.hash_of(&doc.name));
        if !same(doc.hash.as_deref(), remote) {
            diffs.push(HashDiff {
                name: doc.name.clone(),
                local: doc.hash.clone(),
                on_chain: remote.map(String::from),
            });
        }
    }

    if let Some(files) = on_chain {
        for (name, hash) in &files.files {
            let known = snapshot.documents.iter().any(|d| &d.name == name);
            if !known && hash.is_some() {
                diffs.push(HashDiff {
                    name: name.clone(),
                    local: None,
                    on_chain: hash.clone(),
                });
            }
        }
    }

    let remote_composite = on_chain.and_then(|f| f.composite_hash.as_deref());
    if !same(Some(snapshot.composite.as_str()), remote_composite) {
        diffs.push(HashDiff {
            name: COMPOSITE.to_string(),
            local: Some(snapshot.composite.clone()),
            on_chain: remote_composite.map(String::from),
        });
    }

    diffs
}

/// Compare the workspace with the chain and build the next transaction, if any.
pub async fn plan_update<S, B>(
    config: &AgentConfig,
    store: &S,
    client: &ChainClient<B>,
) -> Result<UpdatePlan, UpdateError>
where
    S: DocumentStore + ?Sized,
    B: RegistryBackend,
{
    let chain = client.config();
    let snapshot = compute_snapshot(store, &config.documents)?;
    let mut carried = serde_json::Map::new();

    let (kind, diffs) = match config.agent_id {
        None => {
            tracing::info!("No agent id configured; planning first registration");
            let diffs = diff_hashes(&snapshot, None);
            (PublishKind::Register, diffs)
        }
        Some(agent_id) => {
            let agent = client.lookup_agent(agent_id).await.map_err(|e| {
                if e.is_not_found() {
                    UpdateError::Config(ConfigError::invalid(
                        "agent_id",
                        format!("agent {agent_id} does not exist on chain {}", chain.chain_id),
                    ))
                } else {
                    UpdateError::Chain(e)
                }
            })?;

            if let Some(registration) = &agent.registration
                && let Some(recorded) = registration.agent_id_for(&chain.agent_registry())
                && recorded != agent_id
            {
                return Err(ConfigError::invalid(
                    "agent_id",
                    format!("on-chain registration names agent {recorded}, config says {agent_id}"),
                )
                .into());
            }

            let on_chain = agent.registration.as_ref().and_then(|r| r.hash_set());
            if on_chain.is_none() {
                tracing::info!("Agent {} has no readable on-chain hashes", agent_id);
            }

            let diffs = diff_hashes(&snapshot, on_chain);
            if diffs.is_empty() {
                tracing::info!("Agent {} identity is up to date", agent_id);
                return Ok(UpdatePlan::UpToDate { agent_id, snapshot });
            }
            if let Some(registration) = agent.registration {
                carried = registration.extra;
            }
            (PublishKind::UpdateUri { agent_id }, diffs)
        }
    };

    for diff in &diffs {
        tracing::info!(
            "Changed: {} ({} -> {})",
            diff.name,
            diff.on_chain.as_deref().unwrap_or("none"),
            diff.local.as_deref().unwrap_or("none")
        );
    }

    // Fields written by other tools survive republication.
    let mut document = build_registration(config, chain, Some(&snapshot));
    document.extra = carried;
    let data_uri = encode_data_uri(&document)?;
    let transaction = match kind {
        PublishKind::Register => client.build_register_tx(&data_uri),
        PublishKind::UpdateUri { agent_id } => client.build_update_uri_tx(agent_id, &data_uri),
    };
    let cost_estimate = estimate_uri_cost(&data_uri);
    tracing::info!(
        "Planned {} (~{} gas, advisory)",
        transaction.description,
        cost_estimate.total_gas
    );

    Ok(UpdatePlan::Publish(Box::new(Publication {
        kind,
        chain_id: chain.chain_id,
        snapshot,
        diffs,
        document,
        data_uri,
        transaction,
        cost_estimate,
    })))
}

/// Write the computed artifacts to `dir` for inspection.
///
/// Always writes `snapshot.json` (the offline hash file format); a
/// publication adds
/// `registration.json` and `registration.uri`.
pub fn write_artifacts(plan: &UpdatePlan, dir: &Path) -> Result<Vec<PathBuf>, UpdateError> {
    std::fs::create_dir_all(dir).map_err(|source| UpdateError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let now = chrono::Utc::now().to_rfc3339();
    let mut written = Vec::new();

    let files = match plan.publication() {
        Some(p) => p
            .document
            .identity_files
            .clone()
            .unwrap_or_else(|| p.snapshot.to_identity_files(now)),
        None => plan.snapshot().to_identity_files(now),
    };
    let path = dir.join("snapshot.json");
    atomic_write(&path, serde_json::to_string_pretty(&files).map_err(json_err)?.as_bytes())?;
    written.push(path);

    if let Some(p) = plan.publication() {
        let path = dir.join("registration.json");
        let json = serde_json::to_string_pretty(&p.document).map_err(json_err)?;
        atomic_write(&path, json.as_bytes())?;
        written.push(path);

        let path = dir.join("registration.uri");
        atomic_write(&path, p.data_uri.as_bytes())?;
        written.push(path);
    }

    tracing::info!("Wrote {} artifacts to {}", written.len(), dir.display());
    Ok(written)
}

/// Handoff file consumed by an external signer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handoff {
    pub transaction: UnsignedTransaction,
    pub chain_id: u64,
    pub agent_id: Option<u64>,
    pub action: PublishKind,
    pub data_uri: String,
    pub cost_estimate: CostEstimate,
    pub diffs: Vec<HashDiff>,
    pub generated_at: String,
}

impl Handoff {
    pub fn from_publication(p: &Publication) -> Self {
        let agent_id = match p.kind {
            PublishKind::Register => None,
            PublishKind::UpdateUri { agent_id } => Some(agent_id),
        };
        Self {
            transaction: p.transaction.clone(),
            chain_id: p.chain_id,
            agent_id,
            action: p.kind,
            data_uri: p.data_uri.clone(),
            cost_estimate: p.cost_estimate,
            diffs: p.diffs.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Serialize the unsigned transaction and context for an external signer.
pub fn write_handoff(publication: &Publication, path: &Path) -> Result<Handoff, UpdateError> {
    let handoff = Handoff::from_publication(publication);
    let json = serde_json::to_string_pretty(&handoff).map_err(json_err)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| UpdateError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    atomic_write(path, json.as_bytes())?;
    tracing::info!("Wrote signer handoff to {}", path.display());
    Ok(handoff)
}

/// Hand the transaction to a signer. Fails when none is configured.
pub async fn submit(
    publication: &Publication,
    signer: Option<&dyn TransactionSigner>,
) -> Result<String, UpdateError> {
    let signer = signer.ok_or(UpdateError::SignerUnavailable)?;
    let tx_hash = signer
        .sign_and_send(publication.chain_id, &publication.transaction)
        .await?;
    tracing::info!("Submitted {}: {}", publication.transaction.description, tx_hash);
    Ok(tx_hash)
}

fn json_err(e: serde_json::Error) -> UpdateError {
    UpdateError::Registration(e.into())
}
