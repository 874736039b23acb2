//! Agent identity anchoring (ERC-8004).
//!
//! Three workspace documents define who an agent is. This module hashes
//! them and wraps the hashes in an ERC-8004 registration document that the
//! agent's `tokenURI` points to, so the published state can later be
//! compared against what is on disk.
//!
//! # Architecture
//!
//! Each agent has:
//! - An ordered identity document set (`SOUL.md`, `USER.md`, `IDENTITY.md`)
//! - A registration document (ERC-8004 `RegistrationFile` + `identityFiles`)
//! - An optional on-chain registration (NFT token ID) and token-bound account
//!
//! Snapshots are never persisted on their own; they are recomputed on every
//! call and only leave the process embedded in a registration document.

pub mod hashing;
pub mod registration;

pub use hashing::{
    DEFAULT_DOCUMENTS, DocumentHash, HASH_ALGORITHM, IdentityFiles, IdentitySnapshot,
    compute_snapshot, keccak_hex,
};
pub use registration::{
    CostEstimate, REGISTRATION_V1_TYPE, RegistrationDocument, build_registration,
    decode_data_uri, decode_registration, encode_data_uri, estimate_cost,
};
