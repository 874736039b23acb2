//! Configuration for identity anchoring.
//!
//! Two layers:
//! - [`ChainSettings`]: serde-friendly strings with defaults, as read from a
//!   config file, env vars or CLI flags.
//! - [`ChainConfig`]: the validated, typed value handed to the chain client.
//!   It is immutable and passed in at construction, so several chains can be
//!   used side by side (e.g. in tests).
//!
//! The update workflow reads an [`AgentConfig`] from TOML, or from JSON when
//! the file has a `.json` extension.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::identity::hashing::DEFAULT_DOCUMENTS;
use crate::workspace::Workspace;

/// Base mainnet.
pub const DEFAULT_CHAIN_ID: u64 = 8453;
pub const DEFAULT_RPC_URL: &str = "https://mainnet.base.org";
/// ERC-8004 Identity Registry (mainnet deployments).
pub const DEFAULT_IDENTITY_REGISTRY: &str = "0x8004A169FB4a3325136EB29fA0ceB6D2e539a432";
/// Canonical ERC-6551 registry (v0.3.1), same address on every chain.
pub const DEFAULT_TBA_REGISTRY: &str = "0x000000006551c19487814612e58FE06813775758";
/// Tokenbound AccountV3 implementation.
pub const DEFAULT_TBA_IMPLEMENTATION: &str = "0x41C8f39463A868d3A88af00cd0fe7102F30E44eC";
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Chain connection settings as written in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// EIP-155 chain id.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// ERC-8004 identity registry address.
    #[serde(default = "default_identity_registry")]
    pub identity_registry: String,

    /// ERC-6551 registry address.
    #[serde(default = "default_tba_registry")]
    pub tba_registry: String,

    /// ERC-6551 account implementation address.
    #[serde(default = "default_tba_implementation")]
    pub tba_implementation: String,

    /// Timeout applied to every outbound call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Gateway prefix used to rewrite `ipfs://` URIs.
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_identity_registry() -> String {
    DEFAULT_IDENTITY_REGISTRY.to_string()
}

fn default_tba_registry() -> String {
    DEFAULT_TBA_REGISTRY.to_string()
}

fn default_tba_implementation() -> String {
    DEFAULT_TBA_IMPLEMENTATION.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_ipfs_gateway() -> String {
    DEFAULT_IPFS_GATEWAY.to_string()
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            identity_registry: default_identity_registry(),
            tba_registry: default_tba_registry(),
            tba_implementation: default_tba_implementation(),
            request_timeout_secs: default_request_timeout(),
            ipfs_gateway: default_ipfs_gateway(),
        }
    }
}

impl ChainSettings {
    /// Validate and convert into a typed [`ChainConfig`].
    pub fn resolve(&self) -> Result<ChainConfig, ConfigError> {
        let rpc_url = parse_url("rpc_url", &self.rpc_url)?;

        let mut gateway = self.ipfs_gateway.clone();
        if !gateway.ends_with('/') {
            gateway.push('/');
        }
        let ipfs_gateway = parse_url("ipfs_gateway", &gateway)?;

        if self.chain_id == 0 {
            return Err(ConfigError::invalid("chain_id", "must be non-zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                "must be at least 1 second",
            ));
        }

        Ok(ChainConfig {
            rpc_url,
            chain_id: self.chain_id,
            identity_registry: parse_address("identity_registry", &self.identity_registry)?,
            tba_registry: parse_address("tba_registry", &self.tba_registry)?,
            tba_implementation: parse_address("tba_implementation", &self.tba_implementation)?,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ipfs_gateway,
        })
    }
}

/// Validated chain configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub rpc_url: Url,
    pub chain_id: u64,
    pub identity_registry: Address,
    pub tba_registry: Address,
    pub tba_implementation: Address,
    pub request_timeout: Duration,
    pub ipfs_gateway: Url,
}

impl ChainConfig {
    /// ERC-8004 registry identifier: `eip155:{chainId}:{identityRegistry}`.
    pub fn agent_registry(&self) -> String {
        format!("eip155:{}:{}", self.chain_id, self.identity_registry)
    }
}

/// A service endpoint advertised in the registration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Service name (e.g., "MCP", "A2A", "web").
    pub name: String,
    /// Endpoint URL.
    pub endpoint: String,
    /// Protocol version (optional but recommended).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Extra endpoint attributes (skills, domains, ...), passed through.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Soulbound (non-transferable) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoulboundSettings {
    #[serde(default = "default_true")]
    pub locked: bool,
    #[serde(default = "default_soulbound_standard")]
    pub standard: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

fn default_soulbound_standard() -> String {
    "ERC-5192".to_string()
}

impl Default for SoulboundSettings {
    fn default() -> Self {
        Self {
            locked: true,
            standard: default_soulbound_standard(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Agent definition consumed by the update workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent display name.
    pub name: String,

    /// Natural language description. Defaults to a generated one.
    #[serde(default)]
    pub description: Option<String>,

    /// Image URI for the registration document.
    #[serde(default)]
    pub image: Option<String>,

    /// Workspace directory holding the identity documents.
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    /// Identity documents in composite-hash order.
    #[serde(default = "default_documents")]
    pub documents: Vec<String>,

    /// Owner address (0x-prefixed).
    pub owner: String,

    /// Token id after first registration. None = not registered yet.
    #[serde(default)]
    pub agent_id: Option<u64>,

    /// Service endpoints.
    #[serde(default)]
    pub services: Vec<ServiceEndpoint>,

    /// Supported trust models.
    #[serde(default = "default_supported_trust")]
    pub supported_trust: Vec<String>,

    #[serde(default)]
    pub soulbound: SoulboundSettings,

    #[serde(default)]
    pub chain: ChainSettings,
}

pub fn default_documents() -> Vec<String> {
    DEFAULT_DOCUMENTS.iter().map(|s| s.to_string()).collect()
}

fn default_supported_trust() -> Vec<String> {
    vec!["reputation".to_string()]
}

impl AgentConfig {
    /// Load and validate an agent config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let mut config: Self = if is_json {
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            toml::from_str(&data).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        // Relative workspace paths are relative to the config file.
        if let Some(ws) = &config.workspace
            && ws.is_relative()
            && let Some(parent) = path.parent()
        {
            config.workspace = Some(parent.join(ws));
        }

        config.validate()?;
        tracing::debug!("Loaded agent config {} from {}", config.name, path.display());
        Ok(config)
    }

    /// Check every field that would otherwise fail later, mid-workflow.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Missing("name"));
        }
        parse_address("owner", &self.owner)?;
        validate_documents(&self.documents)?;
        self.chain.resolve()?;
        Ok(())
    }

    /// Owner as a typed address.
    pub fn owner_address(&self) -> Result<Address, ConfigError> {
        parse_address("owner", &self.owner)
    }

    /// Workspace handle; the update workflow cannot run without one, and
    /// the directory must exist.
    pub fn require_workspace(&self) -> Result<Workspace, ConfigError> {
        let root = self
            .workspace
            .as_ref()
            .ok_or(ConfigError::Missing("workspace"))?;
        Workspace::open(root)
    }
}

/// Document names must be bare, unique file names.
pub fn validate_documents(documents: &[String]) -> Result<(), ConfigError> {
    if documents.is_empty() {
        return Err(ConfigError::invalid("documents", "at least one document is required"));
    }
    let mut seen = HashSet::new();
    for doc in documents {
        if !Workspace::is_valid_name(doc) {
            return Err(ConfigError::invalid(
                "documents",
                format!("not a plain file name: {doc}"),
            ));
        }
        if !seen.insert(doc.as_str()) {
            return Err(ConfigError::invalid("documents", format!("duplicate entry: {doc}")));
        }
    }
    Ok(())
}

pub fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value.trim())
        .map_err(|e| ConfigError::invalid(field, format!("{value}: {e}")))
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::invalid(field, format!("{value}: {e}")))
}
