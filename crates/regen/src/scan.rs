//! Directory scanning for generated-id markers.
//!
//! The scanner walks an output directory, extracts each file's embedded
//! identity, and builds a bidirectional uuid-to-path index. It is the first
//! stage of every regeneration (locating the merge base for each file) and
//! also feeds diagnostic tooling (collision and orphan reporting).

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ScanError;
use crate::marker;
use crate::types::{GeneratedFileRecord, Target};

/// Directory names that never contain tracked generated files.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    ".venv",
    "__pycache__",
    "target",
];

/// Scans a directory tree for files carrying `@generated-id` markers.
pub struct Scanner {
    root: PathBuf,
}

/// Index built by one scan.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanResult {
    /// uuid -> relative path (forward slashes). When a uuid collides, the
    /// first path encountered in walk order is kept here; all paths are
    /// listed in [`ScanResult::collisions`].
    pub uuid_to_path: HashMap<String, String>,
    /// relative path -> uuid.
    pub path_to_uuid: HashMap<String, String>,
    /// Uuids found at more than one path.
    pub collisions: Vec<Collision>,
}

/// A uuid found at more than one path within one scan.
#[derive(Debug, Clone, Serialize)]
pub struct Collision {
    pub uuid: String,
    pub paths: Vec<String>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Scanner { root: root.into() }
    }

    /// Walk the tree and index every file with a generated-id marker.
    ///
    /// The root must be a readable directory; individual unreadable files
    /// are skipped with a warning (best-effort scanning). Binary files and
    /// well-known build-artifact directories are skipped.
    pub fn scan(&self) -> Result<ScanResult, ScanError> {
        let meta = std::fs::metadata(&self.root).map_err(|source| ScanError::RootUnreadable {
            path: self.root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ScanError::RootNotADirectory(self.root.clone()));
        }

        let mut result = ScanResult::default();
        let mut seen: HashMap<String, Vec<String>> = HashMap::new();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| SKIP_DIRS.contains(&name)))
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    eprintln!("Warning: skipping unreadable entry under {}: {err}", self.root.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let content = match std::fs::read(entry.path()) {
                Ok(c) => c,
                Err(err) => {
                    eprintln!("Warning: skipping unreadable file {}: {err}", entry.path().display());
                    continue;
                }
            };
            if marker::is_binary(&content) {
                continue;
            }
            let Some(uuid) = marker::extract_generated_id(&content) else {
                continue;
            };

            let rel = rel_unix_path(entry.path(), &self.root);
            seen.entry(uuid.clone()).or_default().push(rel.clone());
            result.uuid_to_path.entry(uuid.clone()).or_insert(rel.clone());
            result.path_to_uuid.insert(rel, uuid);
        }

        let mut collisions: Vec<Collision> = seen
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(uuid, paths)| Collision { uuid, paths })
            .collect();
        collisions.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        result.collisions = collisions;

        Ok(result)
    }
}

/// Relative path with forward slashes (the lockfile/git convention).
fn rel_unix_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Multi-target scanning
// ============================================================================

/// One target's scan within a multi-target pass.
#[derive(Debug, Serialize)]
pub struct TargetScan {
    pub target_id: String,
    pub result: ScanResult,
}

/// A uuid that appears in more than one target's subtree.
#[derive(Debug, Clone, Serialize)]
pub struct CrossTargetCollision {
    pub uuid: String,
    /// (target id, relative path) pairs where the uuid was found.
    pub occurrences: Vec<(String, String)>,
}

/// Result of scanning several targets in one pass.
#[derive(Debug, Serialize)]
pub struct MultiTargetScan {
    pub targets: Vec<TargetScan>,
    pub cross_target: Vec<CrossTargetCollision>,
}

/// Scan several targets' output directories and detect uuids shared across
/// targets.
///
/// Output directories may be nested; a file physically inside two scanned
/// roots is attributed to the deepest root that contains it, so nesting
/// alone never reports a collision.
pub fn scan_targets(targets: &[Target]) -> Result<MultiTargetScan, ScanError> {
    let mut scans = Vec::new();
    for target in targets {
        let result = Scanner::new(&target.out_dir).scan()?;
        scans.push(TargetScan {
            target_id: target.id.clone(),
            result,
        });
    }

    // uuid -> (target id, absolute path, relative path); the absolute path
    // dedupes files visible through nested roots.
    let mut occurrences: HashMap<String, Vec<(String, PathBuf, String)>> = HashMap::new();
    for (target, scan) in targets.iter().zip(&scans) {
        for (uuid, rel) in &scan.result.uuid_to_path {
            let abs = target.out_dir.join(rel);
            occurrences
                .entry(uuid.clone())
                .or_default()
                .push((target.id.clone(), abs, rel.clone()));
        }
    }

    let mut cross_target = Vec::new();
    for (uuid, mut occs) in occurrences {
        // Attribute each physical file to the target with the deepest root
        // (shortest relative path): keep one occurrence per absolute path.
        occs.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.len().cmp(&b.2.len())));
        occs.dedup_by(|a, b| a.1 == b.1);
        let distinct_targets: Vec<&str> = {
            let mut ids: Vec<&str> = occs.iter().map(|(id, _, _)| id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        if distinct_targets.len() > 1 {
            cross_target.push(CrossTargetCollision {
                uuid,
                occurrences: occs
                    .into_iter()
                    .map(|(id, _, rel)| (id, rel))
                    .collect(),
            });
        }
    }
    cross_target.sort_by(|a, b| a.uuid.cmp(&b.uuid));

    Ok(MultiTargetScan {
        targets: scans,
        cross_target,
    })
}

// ============================================================================
// Change summaries
// ============================================================================

/// A git-status-like summary of how working files drifted from their
/// records: deletions, moves, and content modifications.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ChangeSummary {
    pub deleted: Vec<String>,
    /// (original path, current path) pairs.
    pub moved: Vec<(String, String)>,
    pub modified: Vec<String>,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.moved.is_empty() && self.modified.is_empty()
    }

    /// Format as short status lines (` D path`, ` R from -> to`, ` M path`),
    /// truncated to `max_lines` with a trailing `... and N more`.
    pub fn format(&self, max_lines: usize) -> String {
        let mut lines = Vec::new();
        for path in &self.deleted {
            lines.push(format!("  D {path}"));
        }
        for (from, to) in &self.moved {
            lines.push(format!("  R {from} -> {to}"));
        }
        for path in &self.modified {
            lines.push(format!("  M {path}"));
        }

        let total = lines.len();
        if max_lines > 0 && total > max_lines {
            lines.truncate(max_lines);
            lines.push(format!("  ... and {} more", total - max_lines));
        }
        lines.join("\n")
    }
}

/// Compare tracked records against a scan of the current working tree,
/// reporting deletions (uuid gone) and moves (uuid at a different path).
///
/// Content modifications require the pristine bytes and are filled in by
/// the caller.
pub fn diff_records(records: &[GeneratedFileRecord], scan: &ScanResult) -> ChangeSummary {
    let mut summary = ChangeSummary::default();
    for record in records {
        match scan.uuid_to_path.get(&record.uuid) {
            None => summary.deleted.push(record.path.clone()),
            Some(current) if *current != record.path => summary
                .moved
                .push((record.path.clone(), current.clone())),
            Some(_) => {}
        }
    }
    summary.deleted.sort();
    summary.moved.sort();
    summary
}
