//! End-to-end workflows: checking a workspace against the chain, and
//! publishing a fresh registration when they drift apart.

pub mod update;
pub mod verify;

pub use update::{
    Handoff, HashDiff, Publication, PublishKind, TransactionSigner, UpdatePlan, diff_hashes,
    plan_update, submit, write_artifacts, write_handoff,
};
pub use verify::{
    ExpectedSource, FileCheck, FileStatus, Indeterminate, VerificationReport, VerifyOutcome,
    compare, exit_code, load_hash_file, verify_offline, verify_online,
};

use std::path::Path;

use crate::error::UpdateError;

/// Write via a sibling temp file and rename, so readers never see a partial file.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<(), UpdateError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data).map_err(|source| UpdateError::Write {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| UpdateError::Write {
        path: path.to_path_buf(),
        source,
    })
}
