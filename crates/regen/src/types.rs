use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A tracked generated file: the stable identity embedded in the file, the
/// path it was generated at, and the target that owns it.
///
/// Created the first time a file is generated; the path may change across
/// regenerations (renames, moves), the uuid never does. Uuids are unique
/// across the whole repository, including across targets whose output
/// directories overlap or nest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFileRecord {
    pub uuid: String,
    /// Relative path (forward slashes) within the target's output directory.
    pub path: String,
    pub target_id: String,
}

/// A named generation configuration with its own output directory.
///
/// Targets are independent units of concurrency and storage: each owns a
/// disjoint uuid namespace and a disjoint provenance ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub out_dir: PathBuf,
}

impl Target {
    pub fn new(id: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Target {
            id: id.into(),
            out_dir: out_dir.into(),
        }
    }
}

/// One unresolved conflict hunk inside a merged file.
///
/// Lines are 1-indexed and inclusive: `start_line` is the line holding the
/// `<<<<<<<` marker, `end_line` the line holding `>>>>>>>` (or the last line
/// of the file for an unterminated region).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRegion {
    pub start_line: usize,
    pub end_line: usize,
}
