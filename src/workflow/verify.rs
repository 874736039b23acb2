//! Identity verification against a published or supplied hash set.
//!
//! # Flow
//!
//! ```text
//! local snapshot ──┐
//!                  ├─ compare per document + composite ─→ VerificationReport
//! expected set ────┘
//!   ├─ offline: hash file (identityFiles object or full registration)
//!   └─ online:  tokenURI → registration → identityFiles
//! ```
//!
//! Outcomes are split four ways so operators can tell "checked and failed"
//! from "could not check":
//!
//! | outcome | exit |
//! |---------|------|
//! | verified | 0 |
//! | mismatch / missing | 1 |
//! | no registration or no hash data | 2 |
//! | operational error (`VerifyError`) | 3 |

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chain::{ChainClient, RegistryBackend};
use crate::error::VerifyError;
use crate::identity::hashing::{
    HASH_ALGORITHM, IdentityFiles, IdentitySnapshot, compute_snapshot, hashes_equal,
};
use crate::workspace::DocumentStore;

/// Per-document verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Local hash equals the expected hash.
    Verified,
    /// Both hashes present and different: tamper signal.
    Mismatch,
    /// Document absent locally.
    Missing,
    /// Document present locally but nothing recorded to compare against.
    NoChainHash,
}

impl FileStatus {
    fn passes(self, strict: bool) -> bool {
        match self {
            Self::Verified => true,
            Self::NoChainHash => !strict,
            Self::Mismatch | Self::Missing => false,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Verified => "VERIFIED",
            Self::Mismatch => "MISMATCH",
            Self::Missing => "MISSING",
            Self::NoChainHash => "NO_CHAIN_HASH",
        }
    }
}

/// Result of checking one document (or the composite).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCheck {
    pub name: String,
    pub status: FileStatus,
    pub local_hash: Option<String>,
    pub expected_hash: Option<String>,
}

impl fmt::Display for FileCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} local {} expected {}",
            self.status.label(),
            self.name,
            short(self.local_hash.as_deref()),
            short(self.expected_hash.as_deref()),
        )
    }
}

fn short(hash: Option<&str>) -> &str {
    match hash {
        Some(h) => h.get(..14).unwrap_or(h),
        None => "-",
    }
}

/// Where the expected hashes came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExpectedSource {
    Offline { path: PathBuf },
    Chain { agent_id: u64, token_uri: String },
}

/// Itemized comparison of local and expected hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub verified: bool,
    pub source: ExpectedSource,
    pub files: Vec<FileCheck>,
    /// `None` when no expected composite was recorded.
    pub composite: Option<FileCheck>,
    pub local_composite: String,
}

impl VerificationReport {
    pub fn check(&self, name: &str) -> Option<&FileCheck> {
        self.files.iter().find(|c| c.name == name)
    }
}

/// Why verification could not reach a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Indeterminate {
    /// No token exists for the agent id.
    AgentNotFound { agent_id: u64 },
    /// The token URI could not be resolved to a registration document.
    RegistrationUnavailable { agent_id: u64, token_uri: String },
    /// The registration (or hash file) carries no identity hashes.
    NoHashData { source: ExpectedSource },
}

impl fmt::Display for Indeterminate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentNotFound { agent_id } => {
                write!(f, "agent {agent_id} is not registered on-chain")
            }
            Self::RegistrationUnavailable { agent_id, .. } => {
                write!(f, "agent {agent_id} registration file could not be resolved")
            }
            Self::NoHashData { .. } => write!(f, "registration carries no identity hashes"),
        }
    }
}

/// Terminal state of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Verified(VerificationReport),
    Failed(VerificationReport),
    Indeterminate(Indeterminate),
}

impl VerifyOutcome {
    pub const EXIT_VERIFIED: i32 = 0;
    pub const EXIT_MISMATCH: i32 = 1;
    pub const EXIT_NO_REGISTRATION: i32 = 2;
    pub const EXIT_ERROR: i32 = 3;

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Verified(_) => Self::EXIT_VERIFIED,
            Self::Failed(_) => Self::EXIT_MISMATCH,
            Self::Indeterminate(_) => Self::EXIT_NO_REGISTRATION,
        }
    }

    pub fn report(&self) -> Option<&VerificationReport> {
        match self {
            Self::Verified(r) | Self::Failed(r) => Some(r),
            Self::Indeterminate(_) => None,
        }
    }

    fn from_report(report: VerificationReport) -> Self {
        if report.verified {
            Self::Verified(report)
        } else {
            Self::Failed(report)
        }
    }

    /// Human-readable multi-line summary.
    pub fn render(&self) -> String {
        match self {
            Self::Indeterminate(reason) => format!("INDETERMINATE: {reason}"),
            Self::Verified(r) | Self::Failed(r) => {
                let mut lines: Vec<String> = r.files.iter().map(ToString::to_string).collect();
                match &r.composite {
                    Some(c) => lines.push(c.to_string()),
                    None => lines.push(format!(
                        "[UNCHECKED] composite local {}",
                        short(Some(r.local_composite.as_str()))
                    )),
                }
                lines.push(if r.verified {
                    "Identity verified".to_string()
                } else {
                    "IDENTITY VERIFICATION FAILED".to_string()
                });
                lines.join("\n")
            }
        }
    }
}

/// Process exit code for a verification attempt; any operational error is
/// [`VerifyOutcome::EXIT_ERROR`], never an indeterminate verdict.
pub fn exit_code(result: &Result<VerifyOutcome, VerifyError>) -> i32 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(_) => VerifyOutcome::EXIT_ERROR,
    }
}

/// Classify one document.
fn classify(local: Option<&str>, expected: Option<&str>) -> FileStatus {
    match (local, expected) {
        (None, _) => FileStatus::Missing,
        (Some(_), None) => FileStatus::NoChainHash,
        (Some(l), Some(e)) if hashes_equal(l, e) => FileStatus::Verified,
        (Some(_), Some(_)) => FileStatus::Mismatch,
    }
}

/// Compare a local snapshot with an expected hash set.
///
/// With `strict`, `NoChainHash` counts as a failure.
pub fn compare(
    snapshot: &IdentitySnapshot,
    expected: &IdentityFiles,
    source: ExpectedSource,
    strict: bool,
) -> VerificationReport {
    if !expected.algorithm.eq_ignore_ascii_case(HASH_ALGORITHM) {
        tracing::warn!(
            "Expected hashes use '{}', local hashes use {}; digests will not match",
            expected.algorithm,
            HASH_ALGORITHM
        );
    }

    let files: Vec<FileCheck> = snapshot
        .documents
        .iter()
        .map(|doc| {
            let expected_hash = expected.hash_of(&doc.name);
            FileCheck {
                name: doc.name.clone(),
                status: classify(doc.hash.as_deref(), expected_hash),
                local_hash: doc.hash.clone(),
                expected_hash: expected_hash.map(String::from),
            }
        })
        .collect();

    let composite = expected.composite_hash.as_deref().map(|e| FileCheck {
        name: "composite".to_string(),
        status: classify(Some(&snapshot.composite), Some(e)),
        local_hash: Some(snapshot.composite.clone()),
        expected_hash: Some(e.to_string()),
    });

    let verified = files.iter().all(|c| c.status.passes(strict))
        && composite
            .as_ref()
            .is_none_or(|c| c.status == FileStatus::Verified);

    for check in files.iter().chain(composite.iter()) {
        match check.status {
            FileStatus::Mismatch => tracing::warn!("Identity drift: {}", check),
            FileStatus::Missing => tracing::warn!("Identity document missing: {}", check.name),
            _ => tracing::debug!("{}", check),
        }
    }

    VerificationReport {
        verified,
        source,
        files,
        composite,
        local_composite: snapshot.composite.clone(),
    }
}

/// Read an offline hash file.
///
/// Accepts a bare `identityFiles` object or a full registration document.
/// Returns `None` when the file carries no hash data.
pub fn load_hash_file(path: &Path) -> Result<Option<IdentityFiles>, VerifyError> {
    let data = std::fs::read_to_string(path).map_err(|source| VerifyError::HashFileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |e: serde_json::Error| VerifyError::HashFileParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut value: serde_json::Value = serde_json::from_str(&data).map_err(parse_err)?;
    let embedded = value
        .as_object_mut()
        .and_then(|obj| obj.remove("identityFiles"));
    if let Some(inner) = embedded {
        value = inner;
    }
    if value.is_null() {
        return Ok(None);
    }

    let files: IdentityFiles = serde_json::from_value(value).map_err(parse_err)?;
    Ok((!files.is_empty()).then_some(files))
}

/// Verify the workspace against a local hash file.
pub fn verify_offline<S>(
    store: &S,
    documents: &[String],
    hash_file: &Path,
    strict: bool,
) -> Result<VerifyOutcome, VerifyError>
where
    S: DocumentStore + ?Sized,
{
    let snapshot = compute_snapshot(store, documents)?;
    let source = ExpectedSource::Offline {
        path: hash_file.to_path_buf(),
    };

    let Some(expected) = load_hash_file(hash_file)? else {
        return Ok(VerifyOutcome::Indeterminate(Indeterminate::NoHashData { source }));
    };

    tracing::info!("Verifying {} documents against {}", documents.len(), hash_file.display());
    Ok(VerifyOutcome::from_report(compare(&snapshot, &expected, source, strict)))
}

/// Verify the workspace against the agent's on-chain registration.
///
/// A missing agent id is a configuration error raised before any network call.
pub async fn verify_online<S, B>(
    store: &S,
    documents: &[String],
    client: &ChainClient<B>,
    agent_id: Option<u64>,
    strict: bool,
) -> Result<VerifyOutcome, VerifyError>
where
    S: DocumentStore + ?Sized,
    B: RegistryBackend,
{
    let agent_id = agent_id.ok_or(crate::error::ConfigError::Missing("agent_id"))?;
    let snapshot = compute_snapshot(store, documents)?;

    let agent = match client.lookup_agent(agent_id).await {
        Ok(agent) => agent,
        Err(e) if e.is_not_found() => {
            tracing::info!("Agent {} not found on-chain: {}", agent_id, e);
            return Ok(VerifyOutcome::Indeterminate(Indeterminate::AgentNotFound {
                agent_id,
            }));
        }
        Err(e) => return Err(e.into()),
    };

    let source = ExpectedSource::Chain {
        agent_id,
        token_uri: agent.token_uri.clone(),
    };

    let Some(registration) = agent.registration else {
        return Ok(VerifyOutcome::Indeterminate(
            Indeterminate::RegistrationUnavailable {
                agent_id,
                token_uri: agent.token_uri,
            },
        ));
    };

    let Some(expected) = registration.hash_set() else {
        return Ok(VerifyOutcome::Indeterminate(Indeterminate::NoHashData { source }));
    };

    tracing::info!("Verifying {} documents against agent {}", documents.len(), agent_id);
    Ok(VerifyOutcome::from_report(compare(&snapshot, expected, source, strict)))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::chain::client::mock::{MockBackend, client};
    use crate::config::default_documents;
    use crate::identity::registration::{RegistrationDocument, encode_data_uri};
    use crate::workspace::Workspace;
    use alloy::primitives::Address;

    fn workspace(docs: &[(&str, &str)]) -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in docs {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let ws = Workspace::new(dir.path());
        (dir, ws)
    }

    fn full_workspace() -> (tempfile::TempDir, Workspace) {
        workspace(&[
            ("SOUL.md", "# Soul\nBe helpful."),
            ("USER.md", "# User\nLeo."),
            ("IDENTITY.md", "# Identity\nFrack."),
        ])
    }

    fn offline_source() -> ExpectedSource {
        ExpectedSource::Offline {
            path: PathBuf::from("hashes.json"),
        }
    }

    #[test]
    fn snapshot_verifies_against_itself() {
        let (_dir, ws) = full_workspace();
        let snapshot = compute_snapshot(&ws, &default_documents()).unwrap();
        let expected = snapshot.to_identity_files("now");

        let report = compare(&snapshot, &expected, offline_source(), true);
        assert!(report.verified);
        assert!(report.files.iter().all(|c| c.status == FileStatus::Verified));
        assert_eq!(report.composite.unwrap().status, FileStatus::Verified);
    }

    #[test]
    fn changed_document_is_mismatch() {
        let (dir, ws) = full_workspace();
        let expected = compute_snapshot(&ws, &default_documents())
            .unwrap()
            .to_identity_files("now");

        std::fs::write(dir.path().join("USER.md"), "# User\nSomeone else.").unwrap();
        let snapshot = compute_snapshot(&ws, &default_documents()).unwrap();
        let report = compare(&snapshot, &expected, offline_source(), false);

        assert!(!report.verified);
        assert_eq!(report.check("SOUL.md").unwrap().status, FileStatus::Verified);
        assert_eq!(report.check("USER.md").unwrap().status, FileStatus::Mismatch);
        assert_eq!(report.check("IDENTITY.md").unwrap().status, FileStatus::Verified);
        assert_eq!(report.composite.unwrap().status, FileStatus::Mismatch);
    }

    #[test]
    fn missing_document_fails_even_without_expected_hash() {
        let (_dir, ws) = workspace(&[("SOUL.md", "a"), ("USER.md", "b")]);
        let snapshot = compute_snapshot(&ws, &default_documents()).unwrap();
        let mut expected = snapshot.to_identity_files("now");
        expected.files.remove("IDENTITY.md");
        expected.composite_hash = None;

        let report = compare(&snapshot, &expected, offline_source(), false);
        assert_eq!(report.check("IDENTITY.md").unwrap().status, FileStatus::Missing);
        assert!(report.composite.is_none());
        assert!(!report.verified);
    }

    #[test]
    fn no_chain_hash_passes_unless_strict() {
        let (_dir, ws) = full_workspace();
        let snapshot = compute_snapshot(&ws, &default_documents()).unwrap();
        let mut expected = snapshot.to_identity_files("now");
        expected.files.insert("IDENTITY.md".to_string(), None);
        expected.composite_hash = None;

        let lenient = compare(&snapshot, &expected, offline_source(), false);
        assert_eq!(
            lenient.check("IDENTITY.md").unwrap().status,
            FileStatus::NoChainHash
        );
        assert!(lenient.verified);

        let strict = compare(&snapshot, &expected, offline_source(), true);
        assert!(!strict.verified);
    }

    #[test]
    fn offline_hash_file_accepts_registration_and_bare_formats() {
        let (dir, ws) = full_workspace();
        let files = compute_snapshot(&ws, &default_documents())
            .unwrap()
            .to_identity_files("now");

        let bare = dir.path().join("hashes.json");
        std::fs::write(&bare, serde_json::to_string(&files).unwrap()).unwrap();
        let outcome = verify_offline(&ws, &default_documents(), &bare, false).unwrap();
        assert_eq!(outcome.exit_code(), VerifyOutcome::EXIT_VERIFIED);

        let wrapped = dir.path().join("registration.json");
        std::fs::write(
            &wrapped,
            serde_json::json!({"name": "Frack", "identityFiles": files}).to_string(),
        )
        .unwrap();
        let outcome = verify_offline(&ws, &default_documents(), &wrapped, false).unwrap();
        assert!(matches!(outcome, VerifyOutcome::Verified(_)));

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, r#"{"name": "Frack", "identityFiles": null}"#).unwrap();
        let outcome = verify_offline(&ws, &default_documents(), &empty, false).unwrap();
        assert_eq!(outcome.exit_code(), VerifyOutcome::EXIT_NO_REGISTRATION);
    }

    #[test]
    fn unreadable_hash_file_is_operational_error() {
        let (dir, ws) = full_workspace();
        let err = verify_offline(&ws, &default_documents(), &dir.path().join("nope.json"), false)
            .unwrap_err();
        assert!(matches!(err, VerifyError::HashFileRead { .. }));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        let err = verify_offline(&ws, &default_documents(), &garbage, false).unwrap_err();
        assert!(matches!(err, VerifyError::HashFileParse { .. }));
    }

    fn published(ws: &Workspace) -> String {
        let files = compute_snapshot(ws, &default_documents())
            .unwrap()
            .to_identity_files("now");
        let doc: RegistrationDocument = serde_json::from_value(serde_json::json!({
            "type": crate::identity::REGISTRATION_V1_TYPE,
            "name": "Frack",
            "identityFiles": files,
        }))
        .unwrap();
        encode_data_uri(&doc).unwrap()
    }

    #[tokio::test]
    async fn online_verification_of_untouched_workspace() {
        let (_dir, ws) = full_workspace();
        let uri = published(&ws);
        let client = client(MockBackend::with_agent(42, Address::repeat_byte(1), &uri));

        let outcome = verify_online(&ws, &default_documents(), &client, Some(42), false)
            .await
            .unwrap();
        let report = outcome.report().unwrap();
        assert!(report.verified);
        assert_eq!(
            report.source,
            ExpectedSource::Chain {
                agent_id: 42,
                token_uri: uri.clone()
            }
        );
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn online_verification_detects_tampering() {
        let (dir, ws) = full_workspace();
        let uri = published(&ws);
        std::fs::write(dir.path().join("SOUL.md"), "# Soul\nBe evil.").unwrap();
        let client = client(MockBackend::with_agent(42, Address::repeat_byte(1), &uri));

        let outcome = verify_online(&ws, &default_documents(), &client, Some(42), false)
            .await
            .unwrap();
        assert_eq!(outcome.exit_code(), VerifyOutcome::EXIT_MISMATCH);
        assert!(outcome.render().contains("[MISMATCH] SOUL.md"));
    }

    #[tokio::test]
    async fn unregistered_agent_is_indeterminate() {
        let (_dir, ws) = full_workspace();
        let client = client(MockBackend::default());

        let outcome = verify_online(&ws, &default_documents(), &client, Some(7), false)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Indeterminate(Indeterminate::AgentNotFound { agent_id: 7 })
        );
        assert_eq!(outcome.exit_code(), VerifyOutcome::EXIT_NO_REGISTRATION);
    }

    #[tokio::test]
    async fn registration_without_hashes_is_indeterminate() {
        let (_dir, ws) = full_workspace();
        let uri = "data:application/json,%7B%22name%22%3A%22x%22%2C%22identityFiles%22%3Anull%7D";
        let client = client(MockBackend::with_agent(3, Address::repeat_byte(1), uri));

        let outcome = verify_online(&ws, &default_documents(), &client, Some(3), false)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            VerifyOutcome::Indeterminate(Indeterminate::NoHashData { .. })
        ));

        let client = self::client(MockBackend::with_agent(4, Address::repeat_byte(1), "ar://x"));
        let outcome = verify_online(&ws, &default_documents(), &client, Some(4), false)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            VerifyOutcome::Indeterminate(Indeterminate::RegistrationUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn missing_agent_id_and_network_errors_are_operational() {
        let (_dir, ws) = full_workspace();
        let backend = MockBackend {
            fail_rpc: true,
            ..MockBackend::default()
        };
        let client = client(backend);

        let err = verify_online(&ws, &default_documents(), &client, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Config(_)));

        let err = verify_online(&ws, &default_documents(), &client, Some(1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Chain(_)));
    }

    #[tokio::test]
    async fn absent_workspace_fails_before_any_chain_call() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("typo"));
        let hash_file = dir.path().join("hashes.json");
        std::fs::write(&hash_file, r#"{"files":{"SOUL.md":"0x01"}}"#).unwrap();

        let err = verify_offline(&ws, &default_documents(), &hash_file, false).unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Hash(crate::error::HashError::WorkspaceUnavailable(_))
        ));

        // A failing node would surface as a chain error if it were reached.
        let failing = client(MockBackend {
            fail_rpc: true,
            ..MockBackend::default()
        });
        let err = verify_online(&ws, &default_documents(), &failing, Some(1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Hash(_)));
    }

    #[tokio::test]
    async fn unresponsive_node_is_an_error_not_a_verdict() {
        let (_dir, ws) = full_workspace();
        let mut config = crate::chain::client::mock::test_chain_config();
        config.rpc_url = url::Url::parse(&format!(
            "http://{}",
            crate::chain::client::mock::silent_peer().await
        ))
        .unwrap();
        config.request_timeout = std::time::Duration::from_millis(300);
        let client = ChainClient::connect(config);

        let result = verify_online(&ws, &default_documents(), &client, Some(1), false).await;
        assert!(matches!(
            result,
            Err(VerifyError::Chain(crate::error::ChainError::Timeout { .. }))
        ));
        assert_eq!(exit_code(&result), VerifyOutcome::EXIT_ERROR);
    }
}
