//! Identity anchoring for autonomous agents.
//!
//! An agent's identity lives in a handful of workspace documents. This crate
//! hashes them (keccak-256), publishes the hashes inside an ERC-8004
//! registration document, and later checks the workspace against what was
//! published, either on-chain or from a local hash file.
//!
//! Transactions are only ever built, never signed: see
//! [`workflow::TransactionSigner`] for the hand-off point.

pub mod chain;
pub mod config;
pub mod error;
pub mod identity;
pub mod workflow;
pub mod workspace;

pub use chain::{ChainClient, RegistryBackend, UnsignedTransaction};
pub use config::{AgentConfig, ChainConfig, ChainSettings};
pub use error::{ChainError, ConfigError, HashError, UpdateError, VerifyError};
pub use identity::{IdentityFiles, IdentitySnapshot, RegistrationDocument};
pub use workspace::{DocumentStore, Workspace};
