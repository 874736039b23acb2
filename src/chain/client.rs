//! Chain client: registry reads and unsigned transaction builders.
//!
//! Reads go through a [`RegistryBackend`]; builders are pure functions of
//! the [`ChainConfig`] and never touch key material.

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::chain::abi::{IERC6551Registry, IIdentityRegistry};
use crate::chain::backend::{RegistryBackend, RpcBackend};
use crate::chain::resolver::RegistrationFetcher;
use crate::chain::tba::{TbaParams, derive_tba_address};
use crate::chain::UnsignedTransaction;
use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::identity::RegistrationDocument;

/// Read-only projection of one agent's on-chain state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainAgent {
    pub agent_id: u64,
    pub owner: String,
    pub token_uri: String,
    /// Linked agent wallet, if one is set.
    pub wallet: Option<String>,
    /// Parsed registration; `None` if the URI could not be resolved or parsed.
    pub registration: Option<RegistrationDocument>,
}

/// Token-bound account address and whether code is deployed there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TbaStatus {
    pub address: String,
    pub exists: bool,
}

/// Identity registry client.
pub struct ChainClient<B = RpcBackend> {
    config: ChainConfig,
    backend: B,
    fetcher: RegistrationFetcher,
}

impl ChainClient<RpcBackend> {
    /// Client over JSON-RPC for `config`.
    pub fn connect(config: ChainConfig) -> Self {
        let backend = RpcBackend::new(&config);
        Self::with_backend(config, backend)
    }
}

impl<B: RegistryBackend> ChainClient<B> {
    pub fn with_backend(config: ChainConfig, backend: B) -> Self {
        let fetcher = RegistrationFetcher::new(config.request_timeout, config.ipfs_gateway.clone());
        Self {
            config,
            backend,
            fetcher,
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Owner, token URI and wallet of `agent_id`, plus its resolved registration.
    ///
    /// Owner and token URI are required; the wallet is best-effort and a
    /// resolution failure leaves `registration` empty.
    pub async fn lookup_agent(&self, agent_id: u64) -> Result<ChainAgent, ChainError> {
        let id = U256::from(agent_id);
        let (owner, token_uri, wallet) = tokio::join!(
            self.backend.owner_of(id),
            self.backend.token_uri(id),
            self.backend.agent_wallet(id),
        );
        let owner = owner?;
        let token_uri = token_uri?;

        let wallet = match wallet {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!("Agent {} wallet lookup failed: {}", agent_id, e);
                None
            }
        };

        let registration = self.fetch_registration_file(&token_uri).await;
        if registration.is_none() {
            tracing::info!("Agent {} has no resolvable registration file", agent_id);
        }

        Ok(ChainAgent {
            agent_id,
            owner: owner.to_checksum(None),
            token_uri,
            wallet: wallet.map(|w| w.to_checksum(None)),
            registration,
        })
    }

    /// Resolve and parse a registration file. Never fails; `None` on any problem.
    pub async fn fetch_registration_file(&self, uri: &str) -> Option<RegistrationDocument> {
        let value = self.fetcher.fetch(uri).await?;
        serde_json::from_value(value)
            .inspect_err(|e| tracing::warn!("Registration file does not match schema: {}", e))
            .ok()
    }

    fn tba_params(&self, agent_id: u64, salt: B256) -> TbaParams {
        TbaParams {
            registry: self.config.tba_registry,
            implementation: self.config.tba_implementation,
            salt,
            chain_id: self.config.chain_id,
            token_contract: self.config.identity_registry,
            token_id: U256::from(agent_id),
        }
    }

    /// Token-bound account address as reported by the ERC-6551 registry.
    pub async fn get_tba_address(&self, agent_id: u64, salt: B256) -> Result<Address, ChainError> {
        let p = self.tba_params(agent_id, salt);
        let address = self
            .backend
            .tba_account(
                p.implementation,
                p.salt,
                U256::from(p.chain_id),
                p.token_contract,
                p.token_id,
            )
            .await?;

        let local = derive_tba_address(&p);
        if local != address {
            tracing::warn!(
                "Registry returned TBA {} but local derivation gives {}",
                address,
                local
            );
        }
        Ok(address)
    }

    /// Token-bound account address computed locally, without a node.
    pub fn derive_tba_address(&self, agent_id: u64, salt: B256) -> Address {
        derive_tba_address(&self.tba_params(agent_id, salt))
    }

    /// Whether code is deployed at the agent's account address.
    pub async fn tba_exists(&self, agent_id: u64, salt: B256) -> Result<bool, ChainError> {
        Ok(self.tba_status(agent_id, salt).await?.exists)
    }

    /// Address and deployment state of the agent's account.
    pub async fn tba_status(&self, agent_id: u64, salt: B256) -> Result<TbaStatus, ChainError> {
        let address = self.get_tba_address(agent_id, salt).await?;
        let code = self.backend.code_at(address).await?;
        Ok(TbaStatus {
            address: address.to_checksum(None),
            exists: !code.is_empty(),
        })
    }

    /// Keyed metadata; `None` when the key is unset.
    pub async fn get_metadata(&self, agent_id: u64, key: &str) -> Result<Option<Bytes>, ChainError> {
        self.backend.metadata(U256::from(agent_id), key).await
    }

    /// `register(agentURI)`, minting a new agent token.
    pub fn build_register_tx(&self, uri: &str) -> UnsignedTransaction {
        let call = IIdentityRegistry::registerCall {
            agentURI: uri.to_string(),
        };
        UnsignedTransaction::new(
            self.config.identity_registry,
            call.abi_encode(),
            format!("Register new agent ({} byte URI)", uri.len()),
        )
    }

    /// `setAgentURI(agentId, newURI)`.
    pub fn build_update_uri_tx(&self, agent_id: u64, uri: &str) -> UnsignedTransaction {
        let call = IIdentityRegistry::setAgentURICall {
            agentId: U256::from(agent_id),
            newURI: uri.to_string(),
        };
        UnsignedTransaction::new(
            self.config.identity_registry,
            call.abi_encode(),
            format!("Update agent {agent_id} URI ({} bytes)", uri.len()),
        )
    }

    /// `createAccount(...)` on the ERC-6551 registry.
    pub fn build_create_tba_tx(&self, agent_id: u64, salt: B256) -> UnsignedTransaction {
        let p = self.tba_params(agent_id, salt);
        let call = IERC6551Registry::createAccountCall {
            implementation: p.implementation,
            salt: p.salt,
            chainId: U256::from(p.chain_id),
            tokenContract: p.token_contract,
            tokenId: p.token_id,
        };
        UnsignedTransaction::new(
            self.config.tba_registry,
            call.abi_encode(),
            format!(
                "Create token-bound account {} for agent {agent_id}",
                derive_tba_address(&p)
            ),
        )
    }

    /// `setMetadata(agentId, key, value)`.
    pub fn build_set_metadata_tx(
        &self,
        agent_id: u64,
        key: &str,
        value: impl Into<Bytes>,
    ) -> UnsignedTransaction {
        let call = IIdentityRegistry::setMetadataCall {
            agentId: U256::from(agent_id),
            metadataKey: key.to_string(),
            metadataValue: value.into(),
        };
        UnsignedTransaction::new(
            self.config.identity_registry,
            call.abi_encode(),
            format!("Set metadata '{key}' on agent {agent_id}"),
        )
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockBackend, client};
    use super::*;
    use crate::chain::tba::DEFAULT_SALT;

    fn owner() -> Address {
        Address::repeat_byte(0xaa)
    }

    #[tokio::test]
    async fn lookup_resolves_inline_registration() {
        let uri = "data:application/json,%7B%22name%22%3A%22Frack%22%2C%22identityFiles%22%3Anull%7D";
        let mut backend = MockBackend::with_agent(7, owner(), uri);
        backend.wallets.insert(7, Address::repeat_byte(0xbb));
        let client = client(backend);

        let agent = client.lookup_agent(7).await.unwrap();
        assert_eq!(agent.agent_id, 7);
        assert_eq!(agent.owner, owner().to_checksum(None));
        assert_eq!(agent.wallet, Some(Address::repeat_byte(0xbb).to_checksum(None)));
        let registration = agent.registration.unwrap();
        assert_eq!(registration.name, "Frack");
        assert!(registration.identity_files.is_none());
    }

    #[tokio::test]
    async fn lookup_tolerates_unresolvable_uri_and_wallet_failure() {
        let mut backend = MockBackend::with_agent(1, owner(), "ar://somewhere");
        backend.fail_wallet = true;
        let client = client(backend);

        let agent = client.lookup_agent(1).await.unwrap();
        assert!(agent.registration.is_none());
        assert!(agent.wallet.is_none());
        assert_eq!(agent.token_uri, "ar://somewhere");
    }

    #[tokio::test]
    async fn lookup_of_unknown_agent_is_not_found() {
        let client = client(MockBackend::default());
        let err = client.lookup_agent(99).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn rpc_failure_is_operational() {
        let backend = MockBackend {
            fail_rpc: true,
            ..MockBackend::with_agent(1, owner(), "")
        };
        let client = client(backend);
        let err = client.lookup_agent(1).await.unwrap_err();
        assert!(matches!(err, ChainError::Rpc(_)));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn tba_address_is_independent_of_deployment() {
        let undeployed = client(MockBackend::default());
        let status = undeployed.tba_status(5, DEFAULT_SALT).await.unwrap();
        assert!(!status.exists);

        let address = undeployed.derive_tba_address(5, DEFAULT_SALT);
        assert_eq!(status.address, address.to_checksum(None));

        let deployed = client(MockBackend {
            deployed: vec![address],
            ..MockBackend::default()
        });
        assert!(deployed.tba_exists(5, DEFAULT_SALT).await.unwrap());
        assert_eq!(
            deployed.get_tba_address(5, DEFAULT_SALT).await.unwrap(),
            address
        );
    }

    #[tokio::test]
    async fn missing_metadata_is_none() {
        let mut backend = MockBackend::default();
        backend
            .metadata
            .insert((3, "agentWallet".to_string()), Bytes::from_static(b"x"));
        let client = client(backend);

        assert_eq!(
            client.get_metadata(3, "agentWallet").await.unwrap(),
            Some(Bytes::from_static(b"x"))
        );
        assert_eq!(client.get_metadata(3, "other").await.unwrap(), None);
    }

    #[test]
    fn builders_target_the_right_contracts() {
        let client = client(MockBackend::default());
        let registry = client.config().identity_registry;

        let register = client.build_register_tx("data:application/json;base64,e30=");
        assert_eq!(register.to, registry.to_checksum(None));
        assert!(register.data.starts_with(&format!(
            "0x{}",
            hex_selector(&IIdentityRegistry::registerCall::SELECTOR)
        )));

        let update = client.build_update_uri_tx(42, "ipfs://cid");
        assert_eq!(update.to, registry.to_checksum(None));
        let decoded = IIdentityRegistry::setAgentURICall::abi_decode(&update.calldata().unwrap())
            .unwrap();
        assert_eq!(decoded.agentId, U256::from(42));
        assert_eq!(decoded.newURI, "ipfs://cid");

        let tba = client.build_create_tba_tx(42, DEFAULT_SALT);
        assert_eq!(tba.to, client.config().tba_registry.to_checksum(None));
        let decoded = IERC6551Registry::createAccountCall::abi_decode(&tba.calldata().unwrap())
            .unwrap();
        assert_eq!(decoded.tokenContract, registry);
        assert_eq!(decoded.chainId, U256::from(8453));

        let meta = client.build_set_metadata_tx(42, "soul", Bytes::from_static(b"v1"));
        let decoded = IIdentityRegistry::setMetadataCall::abi_decode(&meta.calldata().unwrap())
            .unwrap();
        assert_eq!(decoded.metadataKey, "soul");
        assert_eq!(decoded.metadataValue, Bytes::from_static(b"v1"));
    }

    fn hex_selector(selector: &[u8; 4]) -> String {
        selector.iter().map(|b| format!("{b:02x}")).collect()
    }
}
