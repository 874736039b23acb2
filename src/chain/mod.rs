//! On-chain identity registry access.
//!
//! Reads go through [`RegistryBackend`] (JSON-RPC in production). Writes
//! are only ever *built*: this crate produces [`UnsignedTransaction`]s and
//! hands them to an external signer. It never holds key material.

pub mod abi;
pub mod backend;
pub mod client;
pub mod resolver;
pub mod tba;

pub use backend::{RegistryBackend, RpcBackend};
pub use client::{ChainAgent, ChainClient, TbaStatus};
pub use resolver::{RegistrationFetcher, RegistrationUri};
pub use tba::{DEFAULT_SALT, TbaParams, derive_tba_address};

use alloy::primitives::{Address, hex};
use serde::{Deserialize, Serialize};

/// A fully specified contract call awaiting a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Destination contract (checksummed).
    pub to: String,
    /// ABI-encoded calldata, `0x`-prefixed hex.
    pub data: String,
    /// Human-readable summary for the signer's confirmation prompt.
    pub description: String,
}

impl UnsignedTransaction {
    pub fn new(to: Address, calldata: Vec<u8>, description: impl Into<String>) -> Self {
        Self {
            to: to.to_checksum(None),
            data: hex::encode_prefixed(calldata),
            description: description.into(),
        }
    }

    /// Raw calldata bytes.
    pub fn calldata(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.data)
    }
}
