//! Registration document builder for ERC-8004 registration files.
//!
//! Constructs the JSON document an agent's `tokenURI` points to, embedding
//! the identity document hash set so anyone can check what the owner last
//! approved. The document is published inline as a base64 `data:` URI.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::config::{AgentConfig, ChainConfig, ServiceEndpoint, SoulboundSettings};
use crate::error::RegistrationError;
use crate::identity::hashing::{IdentityFiles, IdentitySnapshot};

/// Schema type constant for ERC-8004 v1 registration files.
pub const REGISTRATION_V1_TYPE: &str = "https://eips.ethereum.org/EIPS/eip-8004#registration-v1";

/// Prefix of an inline base64 JSON registration.
pub const DATA_URI_PREFIX: &str = "data:application/json;base64,";

/// ERC-8004 agent registration file with identity hashes.
///
/// Fields this crate does not know are kept in `extra` and written back
/// unchanged, so documents produced by newer tools survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationDocument {
    /// Schema type identifier.
    #[serde(rename = "type", default)]
    pub schema_type: String,

    /// Agent display name.
    #[serde(default)]
    pub name: String,

    /// Natural language description of the agent.
    #[serde(default)]
    pub description: String,

    /// Agent image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Service endpoints (MCP, A2A, web, etc.).
    #[serde(default)]
    pub services: Vec<ServiceEndpoint>,

    /// Whether the agent is currently active.
    #[serde(default = "default_active")]
    pub active: bool,

    /// On-chain registrations (if any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registrations: Vec<Registration>,

    /// Supported trust models.
    #[serde(
        default,
        rename = "supportedTrust",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub supported_trust: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soulbound: Option<SoulboundSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,

    /// Identity document hashes. Serialized as `null` when not computed.
    #[serde(rename = "identityFiles", default)]
    pub identity_files: Option<IdentityFiles>,

    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_active() -> bool {
    true
}

/// On-chain registration reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// ERC-721 token ID.
    #[serde(rename = "agentId")]
    pub agent_id: u64,

    /// Registry identifier: `{namespace}:{chainId}:{identityRegistry}`.
    #[serde(rename = "agentRegistry")]
    pub agent_registry: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Owner address and the chain it lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub address: String,
    #[serde(rename = "chainId")]
    pub chain_id: u64,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RegistrationDocument {
    /// Agent id recorded for `agent_registry`, if this document lists one.
    pub fn agent_id_for(&self, agent_registry: &str) -> Option<u64> {
        self.registrations
            .iter()
            .find(|r| r.agent_registry.eq_ignore_ascii_case(agent_registry))
            .map(|r| r.agent_id)
    }

    /// Hash set, unless absent or carrying no hashes at all.
    pub fn hash_set(&self) -> Option<&IdentityFiles> {
        self.identity_files.as_ref().filter(|f| !f.is_empty())
    }
}

/// Build a registration document from the agent config.
///
/// `snapshot` is the freshly computed hash set when a workspace is
/// available; without it `identityFiles` is emitted as `null`.
pub fn build_registration(
    config: &AgentConfig,
    chain: &ChainConfig,
    snapshot: Option<&IdentitySnapshot>,
) -> RegistrationDocument {
    let registrations = match config.agent_id {
        Some(agent_id) => vec![Registration {
            agent_id,
            agent_registry: chain.agent_registry(),
            extra: serde_json::Map::new(),
        }],
        None => Vec::new(),
    };

    let identity_files =
        snapshot.map(|s| s.to_identity_files(chrono::Utc::now().to_rfc3339()));

    RegistrationDocument {
        schema_type: REGISTRATION_V1_TYPE.to_string(),
        name: config.name.clone(),
        description: config
            .description
            .clone()
            .unwrap_or_else(|| format!("Autonomous agent: {}", config.name)),
        image: config.image.clone(),
        services: config.services.clone(),
        active: true,
        registrations,
        supported_trust: config.supported_trust.clone(),
        soulbound: Some(config.soulbound.clone()),
        owner: Some(OwnerRef {
            address: config.owner.trim().to_string(),
            chain_id: chain.chain_id,
            extra: serde_json::Map::new(),
        }),
        identity_files,
        extra: serde_json::Map::new(),
    }
}

/// Encode a document as `data:application/json;base64,...`.
pub fn encode_data_uri(doc: &RegistrationDocument) -> Result<String, RegistrationError> {
    let json = serde_json::to_vec(doc)?;
    Ok(format!("{DATA_URI_PREFIX}{}", STANDARD.encode(json)))
}

/// Decode a base64 JSON data URI into a raw JSON value.
pub fn decode_data_uri(uri: &str) -> Result<serde_json::Value, RegistrationError> {
    let payload = uri
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or_else(|| RegistrationError::NotDataUri(truncate(uri, 48)))?;
    let bytes = STANDARD.decode(payload.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode a base64 JSON data URI into a typed document.
pub fn decode_registration(uri: &str) -> Result<RegistrationDocument, RegistrationError> {
    Ok(serde_json::from_value(decode_data_uri(uri)?)?)
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Gas for a plain call (transaction intrinsic cost).
pub const BASE_CALL_GAS: u64 = 21_000;
/// Calldata cost per non-zero byte.
pub const CALLDATA_GAS_PER_BYTE: u64 = 16;
/// Cost of a fresh 32-byte storage slot (SSTORE zero -> non-zero).
pub const STORAGE_GAS_PER_SLOT: u64 = 20_000;

/// Advisory gas estimate for publishing a token URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub payload_bytes: u64,
    pub calldata_gas: u64,
    pub storage_gas: u64,
    pub base_gas: u64,
    pub total_gas: u64,
}

/// Upper-bound gas estimate for storing `uri` on-chain.
///
/// Assumes every byte is non-zero and every slot is fresh. Never
/// authoritative; the node's `eth_estimateGas` is.
pub fn estimate_uri_cost(uri: &str) -> CostEstimate {
    let payload_bytes = uri.len() as u64;
    let calldata_gas = payload_bytes * CALLDATA_GAS_PER_BYTE;
    let storage_gas = payload_bytes.div_ceil(32) * STORAGE_GAS_PER_SLOT;
    CostEstimate {
        payload_bytes,
        calldata_gas,
        storage_gas,
        base_gas: BASE_CALL_GAS,
        total_gas: BASE_CALL_GAS + calldata_gas + storage_gas,
    }
}

/// Upper-bound gas estimate for publishing `doc` as a data URI.
pub fn estimate_cost(doc: &RegistrationDocument) -> Result<CostEstimate, RegistrationError> {
    Ok(estimate_uri_cost(&encode_data_uri(doc)?))
}
