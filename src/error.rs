//! Error types for identity anchoring.
//!
//! Each subsystem owns its error enum. Absence that is expected in normal
//! operation (unregistered agent, unset metadata, unresolvable registration
//! file) is modelled as `Option` by the callers and never appears here.

use std::path::PathBuf;

/// Errors from reading and hashing identity documents.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// A document exists but could not be read. Absence is not an error.
    #[error("failed to read identity document {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("identity document name is not a plain file name: {0}")]
    InvalidName(String),

    /// The workspace itself is gone; no document can be judged missing.
    #[error("workspace unavailable: {0}")]
    WorkspaceUnavailable(#[source] std::io::Error),
}

/// Errors from building, encoding, or decoding registration documents.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("registration serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not a base64 JSON data URI: {0}")]
    NotDataUri(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Errors from chain reads.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The call reached the node but the contract reverted (e.g. nonexistent token).
    #[error("contract call reverted: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },
}

impl ChainError {
    /// Whether the error means the queried entity does not exist on-chain.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Reverted(_))
    }
}

/// Configuration errors. Raised before any network call is made.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Errors raised by an external transaction signer.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("signer rejected transaction: {0}")]
    Rejected(String),

    #[error("signer failed: {0}")]
    Failed(String),
}

/// Operational failures of the verify workflow (exit code 3).
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("failed to read hash file {path}: {source}")]
    HashFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("hash file {path} is not a valid identity hash set: {message}")]
    HashFileParse { path: PathBuf, message: String },
}

/// Errors from the update workflow.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("no signer configured; use the handoff file with an external signer")]
    SignerUnavailable,

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
