//! ERC-6551 token-bound account address derivation.
//!
//! The registry deploys each account as a minimal proxy via CREATE2, so the
//! address is a pure function of (implementation, salt, chain id, token
//! contract, token id) and the registry address. Whether code has been
//! deployed there is a separate fact.

use alloy::primitives::{Address, B256, U256, keccak256};

/// Default salt: one account per (implementation, token).
pub const DEFAULT_SALT: B256 = B256::ZERO;

/// ERC-1167 style proxy header (ERC-6551 reference bytecode, v0.3).
const PROXY_HEADER: [u8; 20] = [
    0x3d, 0x60, 0xad, 0x80, 0x60, 0x0a, 0x3d, 0x39, 0x81, 0xf3, 0x36, 0x3d, 0x3d, 0x37, 0x3d, 0x3d,
    0x3d, 0x36, 0x3d, 0x73,
];

const PROXY_FOOTER: [u8; 15] = [
    0x5a, 0xf4, 0x3d, 0x82, 0x80, 0x3e, 0x90, 0x3d, 0x91, 0x60, 0x2b, 0x57, 0xfd, 0x5b, 0xf3,
];

/// Inputs to an account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TbaParams {
    pub registry: Address,
    pub implementation: Address,
    pub salt: B256,
    pub chain_id: u64,
    pub token_contract: Address,
    pub token_id: U256,
}

/// Account creation bytecode: header, implementation, footer, then
/// `abi.encode(salt, chainId, tokenContract, tokenId)`.
pub fn account_bytecode(params: &TbaParams) -> Vec<u8> {
    let mut code = Vec::with_capacity(20 + 20 + 15 + 32 * 4);
    code.extend_from_slice(&PROXY_HEADER);
    code.extend_from_slice(params.implementation.as_slice());
    code.extend_from_slice(&PROXY_FOOTER);
    code.extend_from_slice(params.salt.as_slice());
    code.extend_from_slice(&U256::from(params.chain_id).to_be_bytes::<32>());
    code.extend_from_slice(params.token_contract.into_word().as_slice());
    code.extend_from_slice(&params.token_id.to_be_bytes::<32>());
    code
}

/// Deterministic account address, identical to the registry's `account(...)` view.
pub fn derive_tba_address(params: &TbaParams) -> Address {
    let init_code_hash = keccak256(account_bytecode(params));
    params.registry.create2(params.salt, init_code_hash)
}
