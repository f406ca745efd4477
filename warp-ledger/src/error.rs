//! User-facing error taxonomy for every ledger operation.
//!
//! All variants are recoverable at the boundary; callers turn them into a
//! remediation message. Internal invariant violations (poisoned locks and
//! the like) are treated as programming errors and panic instead.
use thiserror::Error;

use crate::codec::FileFormatError;
use crate::record::Provenance;
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// No ledger exists for the requested account; prompt the user to import.
    #[error("no warp history stored for this account")]
    NotFound,
    /// The import payload's embedded uid disagrees with the target account.
    #[error("imported records belong to uid {found}, expected {expected}")]
    AccountMismatch { expected: String, found: String },
    /// Structural or per-record failure while decoding an import document.
    #[error("warp history document rejected: {0}")]
    FileFormat(#[from] FileFormatError),
    /// The ledger was first populated from a different record source.
    #[error("history was imported via {existing}; refusing to merge {incoming} records")]
    MixedProvider {
        existing: Provenance,
        incoming: Provenance,
    },
    /// Upstream reports the authkey as malformed. Terminal, no retry.
    #[error("upstream rejected the authkey as invalid")]
    InvalidAuthkey,
    /// Upstream reports the authkey as expired; the user must regenerate it.
    #[error("the authkey has expired, a fresh one must be issued")]
    AuthkeyTimeout,
    /// Transient fetch failure, surfaced only after retries are exhausted.
    #[error("fetching warp history failed: {0}")]
    Fetch(String),
    /// The storage adapter failed to load, save or delete a ledger.
    #[error("ledger storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<ValidationError> for LedgerError {
    fn from(error: ValidationError) -> Self {
        Self::FileFormat(FileFormatError::Record(error))
    }
}
