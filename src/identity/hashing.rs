//! Content hashing for identity documents.
//!
//! Every document is hashed with Ethereum keccak-256. This is NOT NIST
//! SHA3-256: the two differ in padding and produce different digests for the
//! same input, and only keccak-256 matches what contracts compute on-chain.
//!
//! # Composite hash
//!
//! ```text
//! composite = keccak256(h_1 || h_2 || ... || h_n)
//! ```
//!
//! where each `h_i` is the raw 32-byte digest of document `i` in configured
//! order, or [`ZERO_HASH`] when the document is missing. keccak256 of empty
//! content is a real digest, so "missing" and "empty" yield different
//! composites.

use std::collections::BTreeMap;
use std::io;

use alloy::primitives::{B256, keccak256};
use serde::{Deserialize, Serialize};

use crate::error::HashError;
use crate::workspace::DocumentStore;

/// Algorithm tag embedded in registration documents.
pub const HASH_ALGORITHM: &str = "keccak256";

/// Placeholder digest for a missing document.
pub const ZERO_HASH: B256 = B256::ZERO;

/// Charter, user profile and identity statement, in composite order.
pub const DEFAULT_DOCUMENTS: &[&str] = &["SOUL.md", "USER.md", "IDENTITY.md"];

/// Hash of a single identity document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHash {
    pub name: String,
    pub exists: bool,
    /// `0x`-prefixed keccak-256 hex digest; `None` when the document is missing.
    pub hash: Option<String>,
}

/// Hashes of the full ordered document set plus their composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub documents: Vec<DocumentHash>,
    pub composite: String,
}

impl IdentitySnapshot {
    /// Local hash of `name`, if the document is part of the set and exists.
    pub fn hash_of(&self, name: &str) -> Option<&str> {
        self.documents
            .iter()
            .find(|d| d.name == name)
            .and_then(|d| d.hash.as_deref())
    }

    /// Names of documents that were absent at hashing time.
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.documents
            .iter()
            .filter(|d| !d.exists)
            .map(|d| d.name.as_str())
    }

    /// Serialized hash set as embedded in a registration document.
    pub fn to_identity_files(&self, generated_at: impl Into<String>) -> IdentityFiles {
        IdentityFiles {
            algorithm: HASH_ALGORITHM.to_string(),
            generated_at: generated_at.into(),
            files: self
                .documents
                .iter()
                .map(|d| (d.name.clone(), d.hash.clone()))
                .collect(),
            composite_hash: Some(self.composite.clone()),
            extra: serde_json::Map::new(),
        }
    }
}

/// The `identityFiles` object of a registration document.
///
/// Also the format of an offline hash file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityFiles {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub files: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub composite_hash: Option<String>,

    /// Attestations or other fields added by newer tooling.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_algorithm() -> String {
    HASH_ALGORITHM.to_string()
}

impl IdentityFiles {
    /// Recorded hash for `name`; `None` if absent or recorded as null.
    pub fn hash_of(&self, name: &str) -> Option<&str> {
        self.files.get(name).and_then(|h| h.as_deref())
    }

    /// Whether the set carries any hash data at all.
    pub fn is_empty(&self) -> bool {
        self.composite_hash.is_none() && self.files.values().all(Option::is_none)
    }
}

/// keccak-256 of `data` as `0x`-prefixed lowercase hex.
pub fn keccak_hex(data: &[u8]) -> String {
    format!("{:#x}", keccak256(data))
}

/// Composite digest over an ordered list of per-document digests.
pub fn composite_hash(digests: &[Option<B256>]) -> B256 {
    let mut buf = Vec::with_capacity(digests.len() * 32);
    for digest in digests {
        buf.extend_from_slice(digest.unwrap_or(ZERO_HASH).as_slice());
    }
    keccak256(&buf)
}

/// Read and hash every document in `names`, in order.
///
/// A missing document is recorded, not raised. Any other read failure
/// aborts the snapshot.
pub fn compute_snapshot<S, N>(store: &S, names: &[N]) -> Result<IdentitySnapshot, HashError>
where
    S: DocumentStore + ?Sized,
    N: AsRef<str>,
{
    store
        .ensure_available()
        .map_err(HashError::WorkspaceUnavailable)?;

    let mut documents = Vec::with_capacity(names.len());
    let mut digests = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref();
        match store.read(name) {
            Ok(bytes) => {
                let digest = keccak256(&bytes);
                tracing::debug!("Hashed {} ({} bytes): {:#x}", name, bytes.len(), digest);
                documents.push(DocumentHash {
                    name: name.to_string(),
                    exists: true,
                    hash: Some(format!("{digest:#x}")),
                });
                digests.push(Some(digest));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Identity document {} not found", name);
                documents.push(DocumentHash {
                    name: name.to_string(),
                    exists: false,
                    hash: None,
                });
                digests.push(None);
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                return Err(HashError::InvalidName(name.to_string()));
            }
            Err(source) => {
                return Err(HashError::Io {
                    name: name.to_string(),
                    source,
                });
            }
        }
    }

    Ok(IdentitySnapshot {
        documents,
        composite: format!("{:#x}", composite_hash(&digests)),
    })
}

/// Case-insensitive digest comparison (hex may be checksummed or uppercased by hand).
pub fn hashes_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
