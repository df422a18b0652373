use std::path::PathBuf;
use thiserror::Error;

/// Errors from the pristine snapshot store.
///
/// These are provenance I/O errors in the error taxonomy: merging against
/// an untrustworthy store risks silent data loss, so they abort the
/// affected target's generation immediately.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("failed to open repository at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("refusing to commit an empty snapshot for target '{0}'")]
    EmptySnapshot(String),

    #[error("provenance ref {0} was updated by another writer")]
    RefMoved(String),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

/// Errors from a single target's regeneration.
///
/// Reported per target so one broken target never prevents the others in a
/// multi-target run from completing. Network problems are deliberately not
/// represented here; the healer downgrades them to warnings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("identity error in target '{target}': {details}")]
    Identity { target: String, details: String },

    #[error(transparent)]
    Scan(#[from] regen::ScanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("generator failed for target '{target}': {message}")]
    Generator { target: String, message: String },

    #[error("worker for target '{target}' panicked")]
    Worker { target: String },
}
