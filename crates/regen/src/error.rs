use std::path::PathBuf;
use thiserror::Error;

/// Errors from the identity scanner.
///
/// Only the scan root itself is load-bearing: individual files that cannot
/// be read are skipped with a warning, not surfaced here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScanError {
    #[error("scan root {path} is not a readable directory: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scan root {0} is not a directory")]
    RootNotADirectory(PathBuf),
}
