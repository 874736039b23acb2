//! Raw contract reads behind a trait seam.
//!
//! [`RegistryBackend`] is the narrow surface the chain client needs from a
//! node. [`RpcBackend`] implements it over an alloy HTTP provider; tests
//! substitute an in-memory backend.
//!
//! Every RPC call is bounded by the configured timeout. An elapsed timer
//! becomes [`ChainError::Timeout`]; nothing waits indefinitely and nothing
//! is retried here.

use std::future::Future;
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;

use crate::chain::abi::{IERC6551Registry, IIdentityRegistry};
use crate::config::ChainConfig;
use crate::error::ChainError;

/// Contract reads used by the chain client.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Owner of an agent token. Reverts for nonexistent tokens.
    async fn owner_of(&self, agent_id: U256) -> Result<Address, ChainError>;

    /// Raw `tokenURI` of an agent token.
    async fn token_uri(&self, agent_id: U256) -> Result<String, ChainError>;

    /// Linked agent wallet. `Ok(None)` when unset (zero address).
    async fn agent_wallet(&self, agent_id: U256) -> Result<Option<Address>, ChainError>;

    /// Keyed metadata. `Ok(None)` when the key holds no value.
    async fn metadata(&self, agent_id: U256, key: &str) -> Result<Option<Bytes>, ChainError>;

    /// ERC-6551 registry `account(...)` view.
    async fn tba_account(
        &self,
        implementation: Address,
        salt: B256,
        chain_id: U256,
        token_contract: Address,
        token_id: U256,
    ) -> Result<Address, ChainError>;

    /// Deployed code at `address` (empty when none).
    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError>;
}

/// JSON-RPC backend over HTTP.
pub struct RpcBackend {
    provider: DynProvider,
    identity_registry: Address,
    tba_registry: Address,
    timeout: Duration,
}

impl RpcBackend {
    /// Connect lazily; no request is made until the first read.
    pub fn new(config: &ChainConfig) -> Self {
        let provider = ProviderBuilder::new()
            .connect_http(config.rpc_url.clone())
            .erased();
        Self {
            provider,
            identity_registry: config.identity_registry,
            tba_registry: config.tba_registry,
            timeout: config.request_timeout,
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ChainError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", operation, self.timeout);
                Err(ChainError::Timeout {
                    operation,
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// Separate "the contract said no" from "could not reach the contract".
///
/// Only a genuine revert counts as the former. Rate limits, unknown methods
/// and node-side failures are also JSON-RPC error responses, but they say
/// nothing about the token.
fn classify(err: alloy::contract::Error) -> ChainError {
    let reverted = match &err {
        alloy::contract::Error::TransportError(e) => e.as_error_resp().is_some_and(|payload| {
            is_revert(
                payload.code,
                &payload.message,
                payload.as_revert_data().is_some(),
            )
        }),
        _ => false,
    };
    if reverted {
        ChainError::Reverted(err.to_string())
    } else {
        ChainError::Rpc(err.to_string())
    }
}

/// JSON-RPC code 3 (and the geth-style message) carries a revert; so does
/// any payload with decodable revert data.
fn is_revert(code: i64, message: &str, has_revert_data: bool) -> bool {
    code == 3 || has_revert_data || message.to_ascii_lowercase().contains("execution reverted")
}

#[async_trait]
impl RegistryBackend for RpcBackend {
    async fn owner_of(&self, agent_id: U256) -> Result<Address, ChainError> {
        let registry = IIdentityRegistry::new(self.identity_registry, self.provider.clone());
        self.bounded("ownerOf", async {
            registry.ownerOf(agent_id).call().await.map_err(classify)
        })
        .await
    }

    async fn token_uri(&self, agent_id: U256) -> Result<String, ChainError> {
        let registry = IIdentityRegistry::new(self.identity_registry, self.provider.clone());
        self.bounded("tokenURI", async {
            registry.tokenURI(agent_id).call().await.map_err(classify)
        })
        .await
    }

    async fn agent_wallet(&self, agent_id: U256) -> Result<Option<Address>, ChainError> {
        let registry = IIdentityRegistry::new(self.identity_registry, self.provider.clone());
        let wallet = self
            .bounded("getAgentWallet", async {
                registry.getAgentWallet(agent_id).call().await.map_err(classify)
            })
            .await?;
        Ok((!wallet.is_zero()).then_some(wallet))
    }

    async fn metadata(&self, agent_id: U256, key: &str) -> Result<Option<Bytes>, ChainError> {
        let registry = IIdentityRegistry::new(self.identity_registry, self.provider.clone());
        let value = self
            .bounded("getMetadata", async {
                registry
                    .getMetadata(agent_id, key.to_string())
                    .call()
                    .await
                    .map_err(classify)
            })
            .await?;
        Ok((!value.is_empty()).then_some(value))
    }

    async fn tba_account(
        &self,
        implementation: Address,
        salt: B256,
        chain_id: U256,
        token_contract: Address,
        token_id: U256,
    ) -> Result<Address, ChainError> {
        let registry = IERC6551Registry::new(self.tba_registry, self.provider.clone());
        self.bounded("account", async {
            registry
                .account(implementation, salt, chain_id, token_contract, token_id)
                .call()
                .await
                .map_err(classify)
        })
        .await
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        self.bounded("getCode", async {
            self.provider
                .get_code_at(address)
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
    }
}
