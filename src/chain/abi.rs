//! Contract interfaces consumed by the chain client.
//!
//! - ERC-8004 Identity Registry: an ERC-721 whose `tokenURI` points at the
//!   agent's registration document.
//! - ERC-6551 Registry: deterministic token-bound account addresses.
//!
//! Only the entry points this crate reads or builds calldata for are declared.
//! `register` is declared once (URI form) so the generated call type is not
//! overloaded.

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IIdentityRegistry {
        // ERC-721
        function ownerOf(uint256 tokenId) external view returns (address);
        function tokenURI(uint256 tokenId) external view returns (string memory);

        // ERC-8004
        function register(string calldata agentURI) external returns (uint256 agentId);
        function setAgentURI(uint256 agentId, string calldata newURI) external;
        function getAgentWallet(uint256 agentId) external view returns (address);
        function getMetadata(uint256 agentId, string calldata metadataKey) external view returns (bytes memory);
        function setMetadata(uint256 agentId, string calldata metadataKey, bytes calldata metadataValue) external;

        event Registered(uint256 indexed agentId, string agentURI, address indexed owner);
        event URIUpdated(uint256 indexed agentId, string newURI, address indexed updatedBy);

        error ERC721NonexistentToken(uint256 tokenId);
    }
}

sol! {
    #[sol(rpc)]
    interface IERC6551Registry {
        function account(
            address implementation,
            bytes32 salt,
            uint256 chainId,
            address tokenContract,
            uint256 tokenId
        ) external view returns (address account);

        function createAccount(
            address implementation,
            bytes32 salt,
            uint256 chainId,
            address tokenContract,
            uint256 tokenId
        ) external returns (address account);

        event ERC6551AccountCreated(
            address account,
            address indexed implementation,
            bytes32 salt,
            uint256 chainId,
            address indexed tokenContract,
            uint256 indexed tokenId
        );
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;
    use alloy::sol_types::SolCall;

    use super::*;

    #[test]
    fn selectors_match_deployed_contracts() {
        // keccak256("ownerOf(uint256)")[..4]
        assert_eq!(IIdentityRegistry::ownerOfCall::SELECTOR, [0x63, 0x52, 0x21, 0x1e]);
        // keccak256("tokenURI(uint256)")[..4]
        assert_eq!(IIdentityRegistry::tokenURICall::SELECTOR, [0xc8, 0x7b, 0x56, 0xdd]);
    }

    #[test]
    fn calls_encode() {
        let call = IIdentityRegistry::setAgentURICall {
            agentId: U256::from(1),
            newURI: "ipfs://x".to_string(),
        };
        let data = call.abi_encode();
        assert_eq!(&data[..4], &IIdentityRegistry::setAgentURICall::SELECTOR);
        // selector + id + offset + length + one padded word
        assert_eq!(data.len(), 4 + 32 * 4);
    }
}
