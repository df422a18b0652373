//! Per-target regeneration.
//!
//! One run of a target is: heal the provenance ref -> index the previous
//! pristine snapshot -> scan the output directory -> three-way merge each
//! fresh file -> write results to disk -> commit the fresh output as the new
//! pristine snapshot -> optionally publish the ref. Disk writes always land
//! before the commit, so a crash can never advance provenance past what is
//! actually on disk.
//!
//! Targets are independent: each worker opens its own repository handle,
//! owns its own ref, and fails on its own without taking down the others.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use regen::marker;
use regen::merge;
use regen::scan::{ScanResult, Scanner};
use regen::{ConflictRegion, Target};

use crate::error::EngineError;
use crate::store::{PristineIndex, ProvenanceStore};
use crate::sync::{PushOutcome, RefAvailability, SyncOptions, ensure_ref_available, publish_ref};

/// Settings for a regeneration run.
#[derive(Debug, Clone)]
pub struct RegenOptions {
    pub remote: String,
    pub timeout: Duration,
    /// Publish each target's ref after a successful commit (best effort).
    pub push: bool,
}

impl Default for RegenOptions {
    fn default() -> Self {
        RegenOptions {
            remote: "origin".to_string(),
            timeout: Duration::from_secs(30),
            push: false,
        }
    }
}

impl RegenOptions {
    fn sync(&self) -> SyncOptions {
        SyncOptions {
            remote: self.remote.clone(),
            timeout: self.timeout,
        }
    }
}

/// What happened to one file during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Fresh output written without needing a merge (new file, or no local
    /// edits to preserve).
    Written { path: String },
    /// Three-way merge applied cleanly; hand edits preserved.
    Merged {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        moved_from: Option<String>,
    },
    /// Overlapping edits; the file on disk carries conflict markers.
    Conflicted {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        moved_from: Option<String>,
        regions: Vec<ConflictRegion>,
    },
    /// No identity marker; written as-is and not merged.
    Untracked { path: String },
    /// Removed by the generator; the unedited working copy was deleted.
    Deleted { path: String },
    /// Removed by the generator, but the working copy was hand-edited and
    /// is kept on disk.
    PreservedEdit { path: String },
}

impl FileOutcome {
    pub fn path(&self) -> &str {
        match self {
            FileOutcome::Written { path }
            | FileOutcome::Merged { path, .. }
            | FileOutcome::Conflicted { path, .. }
            | FileOutcome::Untracked { path }
            | FileOutcome::Deleted { path }
            | FileOutcome::PreservedEdit { path } => path,
        }
    }
}

/// Result of one target's regeneration.
#[derive(Debug, Serialize)]
pub struct TargetReport {
    pub target_id: String,
    /// New pristine snapshot commit (hex).
    pub commit: String,
    pub availability: RefAvailability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushOutcome>,
    pub files: Vec<FileOutcome>,
    pub warnings: Vec<String>,
    pub completed_at: String,
}

impl TargetReport {
    pub fn conflicted_files(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Conflicted { .. }))
            .count()
    }

    pub fn has_conflicts(&self) -> bool {
        self.conflicted_files() > 0
    }
}

/// The collaborator that produces fresh output for a target: a map of
/// relative path -> generated bytes, deterministic for unchanged input.
pub trait Generator {
    fn generate(&self, target: &Target) -> anyhow::Result<BTreeMap<String, Vec<u8>>>;
}

/// Generator output staged on disk (the common CLI case: the template
/// engine writes into a scratch directory, this engine reconciles it).
pub struct StagedOutput {
    root: PathBuf,
}

impl StagedOutput {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StagedOutput { root: root.into() }
    }
}

impl Generator for StagedOutput {
    fn generate(&self, _target: &Target) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
        read_staged_tree(&self.root)
    }
}

/// Read a staged output directory into a path -> content map.
pub fn read_staged_tree(root: &Path) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
    use anyhow::Context;
    let mut files = BTreeMap::new();
    collect_files(root, root, &mut files)
        .with_context(|| format!("failed to read staged output at {}", root.display()))?;
    Ok(files)
}

fn collect_files(
    root: &Path,
    dir: &Path,
    files: &mut BTreeMap<String, Vec<u8>>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, files)?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(rel, fs::read(&path)?);
        }
    }
    Ok(())
}

/// Regenerate one target from fresh generator output.
pub fn regenerate_target(
    repo_root: &Path,
    target: &Target,
    fresh: BTreeMap<String, Vec<u8>>,
    opts: &RegenOptions,
) -> Result<TargetReport, EngineError> {
    let store = ProvenanceStore::open(repo_root)?;
    regenerate_with_store(&store, target, fresh, opts)
}

/// Regenerate one target, running the generator collaborator first.
pub fn regenerate_with_generator(
    repo_root: &Path,
    target: &Target,
    generator: &dyn Generator,
    opts: &RegenOptions,
) -> Result<TargetReport, EngineError> {
    let fresh = generator
        .generate(target)
        .map_err(|err| EngineError::Generator {
            target: target.id.clone(),
            message: format!("{err:#}"),
        })?;
    regenerate_target(repo_root, target, fresh, opts)
}

/// Regenerate one target against an already-open store.
pub fn regenerate_with_store(
    store: &ProvenanceStore,
    target: &Target,
    fresh: BTreeMap<String, Vec<u8>>,
    opts: &RegenOptions,
) -> Result<TargetReport, EngineError> {
    let mut warnings = Vec::new();

    // Heal: a cold clone fetches just this target's ref; any failure means
    // we merge with local information only.
    let availability = ensure_ref_available(store, &target.id, &opts.sync());
    if let RefAvailability::Unavailable(reason) = &availability {
        let warning = format!(
            "provenance for '{}' unavailable ({reason}); merging with local information only",
            target.id
        );
        eprintln!("Warning: {warning}");
        warnings.push(warning);
    }

    let pristine = store.pristine_index(&target.id)?;

    let disk = if target.out_dir.is_dir() {
        Scanner::new(&target.out_dir).scan()?
    } else {
        ScanResult::default()
    };
    if !disk.collisions.is_empty() {
        let details: Vec<String> = disk
            .collisions
            .iter()
            .map(|c| format!("{} at [{}]", c.uuid, c.paths.join(", ")))
            .collect();
        return Err(EngineError::Identity {
            target: target.id.clone(),
            details: details.join("; "),
        });
    }

    let mut outcomes = Vec::new();
    let mut snapshot: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut tracked: Vec<(String, String, Vec<u8>)> = Vec::new();
    let mut fresh_uuids: HashSet<String> = HashSet::new();

    // Stamp identities into the fresh output. The snapshot we commit is
    // exactly what lands on a clean disk: marker included.
    for (path, content) in fresh {
        let content = if marker::is_binary(&content) {
            content
        } else if marker::extract_generated_id(&content).is_some() {
            content
        } else {
            let id = pristine
                .as_ref()
                .and_then(|index| pristine_id_at_path(index, &path))
                .or_else(|| disk.path_to_uuid.get(&path).cloned())
                .unwrap_or_else(marker::mint_id);
            let text = String::from_utf8_lossy(&content).into_owned();
            match marker::embed_generated_id(&path, &text, &id) {
                Some(stamped) => stamped.into_bytes(),
                None => content,
            }
        };

        match marker::extract_generated_id(&content) {
            Some(uuid) => {
                if !fresh_uuids.insert(uuid.clone()) {
                    return Err(EngineError::Identity {
                        target: target.id.clone(),
                        details: format!(
                            "generator produced duplicate generated-id {uuid}"
                        ),
                    });
                }
                tracked.push((path.clone(), uuid, content.clone()));
                snapshot.insert(path, content);
            }
            None => {
                write_file(&target.out_dir, &path, &content)?;
                outcomes.push(FileOutcome::Untracked { path: path.clone() });
                snapshot.insert(path, content);
            }
        }
    }

    // Merge each tracked fresh file against its pristine base and the
    // working copy at the file's current location (moves are hand edits
    // and are preserved).
    for (gen_path, uuid, fresh_content) in &tracked {
        let base = match &pristine {
            Some(index) => match index.get(uuid) {
                Some(entry) => Some(store.blob_content(entry.blob)?),
                None => None,
            },
            None => None,
        };

        let current_rel = disk
            .uuid_to_path
            .get(uuid)
            .cloned()
            .unwrap_or_else(|| gen_path.clone());
        let moved_from = (current_rel != *gen_path).then(|| gen_path.clone());
        let abs = target.out_dir.join(&current_rel);

        if !abs.is_file() {
            write_file(&target.out_dir, &current_rel, fresh_content)?;
            outcomes.push(FileOutcome::Written { path: current_rel });
            continue;
        }

        let ours = fs::read(&abs).map_err(|source| EngineError::Io {
            path: abs.clone(),
            source,
        })?;
        let had_edits = base.as_deref() != Some(ours.as_slice()) && ours != *fresh_content;
        let merged = merge::merge(base.as_deref(), &ours, fresh_content);
        write_file(&target.out_dir, &current_rel, &merged.content)?;

        if !merged.conflicts.is_empty() {
            let warning = format!(
                "{current_rel}: {} unresolved conflict region(s); markers left in place",
                merged.conflicts.len()
            );
            eprintln!("Warning: {warning}");
            warnings.push(warning);
            outcomes.push(FileOutcome::Conflicted {
                path: current_rel,
                moved_from,
                regions: merged.conflicts,
            });
        } else if had_edits {
            outcomes.push(FileOutcome::Merged {
                path: current_rel,
                moved_from,
            });
        } else {
            outcomes.push(FileOutcome::Written { path: current_rel });
        }
    }

    // Files the generator dropped: delete unedited working copies, keep
    // hand-edited ones.
    if let Some(index) = &pristine {
        let mut stale: Vec<_> = index
            .iter()
            .filter(|(uuid, _)| !fresh_uuids.contains(*uuid))
            .collect();
        stale.sort_by(|a, b| a.1.path.cmp(&b.1.path));

        for (uuid, entry) in stale {
            let current_rel = disk
                .uuid_to_path
                .get(uuid)
                .cloned()
                .unwrap_or_else(|| entry.path.clone());
            let abs = target.out_dir.join(&current_rel);
            if !abs.is_file() {
                continue;
            }
            let on_disk = fs::read(&abs).map_err(|source| EngineError::Io {
                path: abs.clone(),
                source,
            })?;
            if on_disk == store.blob_content(entry.blob)? {
                fs::remove_file(&abs).map_err(|source| EngineError::Io {
                    path: abs.clone(),
                    source,
                })?;
                outcomes.push(FileOutcome::Deleted { path: current_rel });
            } else {
                let warning = format!(
                    "{current_rel}: removed by the generator but hand-edited; keeping the edited file"
                );
                eprintln!("Warning: {warning}");
                warnings.push(warning);
                outcomes.push(FileOutcome::PreservedEdit { path: current_rel });
            }
        }
    }

    // Disk state is final; only now does provenance advance.
    let commit = store.commit_pristine(&target.id, &snapshot)?;

    let mut push = None;
    if opts.push {
        let outcome = publish_ref(store, &target.id, &opts.sync());
        if let PushOutcome::Skipped(reason) = &outcome {
            let warning = format!("publish of '{}' skipped: {reason}", target.id);
            eprintln!("Warning: {warning}");
            warnings.push(warning);
        }
        push = Some(outcome);
    }

    Ok(TargetReport {
        target_id: target.id.clone(),
        commit: commit.to_string(),
        availability,
        push,
        files: outcomes,
        warnings,
        completed_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    })
}

fn pristine_id_at_path(index: &PristineIndex, path: &str) -> Option<String> {
    index
        .iter()
        .find(|(_, entry)| entry.path == path)
        .map(|(uuid, _)| uuid.clone())
}

fn write_file(out_dir: &Path, rel: &str, content: &[u8]) -> Result<(), EngineError> {
    let path = out_dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| EngineError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&path, content).map_err(|source| EngineError::Io { path, source })
}

// ============================================================================
// Multi-target runs
// ============================================================================

/// One target's work item in a multi-target run.
pub struct RegenJob {
    pub target: Target,
    pub fresh: BTreeMap<String, Vec<u8>>,
}

/// Regenerate several targets, one worker per target.
///
/// Workers are scoped threads joined before this returns; each opens its
/// own repository handle, and since every target owns a disjoint ref,
/// git's per-ref locking is the only synchronization needed. A failing
/// target yields its own `Err` entry without disturbing the others.
/// Fresh output sharing a generated-id across targets fails the affected
/// targets before any of them commits.
pub fn regenerate_all(
    repo_root: &Path,
    jobs: Vec<RegenJob>,
    opts: &RegenOptions,
) -> Vec<(String, Result<TargetReport, EngineError>)> {
    let mut owners: HashMap<String, String> = HashMap::new();
    let mut poisoned: HashMap<String, String> = HashMap::new();
    for job in &jobs {
        for content in job.fresh.values() {
            let Some(uuid) = marker::extract_generated_id(content) else {
                continue;
            };
            match owners.get(&uuid) {
                None => {
                    owners.insert(uuid, job.target.id.clone());
                }
                Some(owner) if *owner == job.target.id => {}
                Some(owner) => {
                    let details = format!(
                        "generated-id {uuid} appears in both '{owner}' and '{}'",
                        job.target.id
                    );
                    poisoned.insert(owner.clone(), details.clone());
                    poisoned.insert(job.target.id.clone(), details);
                }
            }
        }
    }

    thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let target_id = job.target.id.clone();
                let poison = poisoned.get(&target_id).cloned();
                let handle = scope.spawn(move || {
                    if let Some(details) = poison {
                        return Err(EngineError::Identity {
                            target: job.target.id.clone(),
                            details,
                        });
                    }
                    regenerate_target(repo_root, &job.target, job.fresh, opts)
                });
                (target_id, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(target_id, handle)| match handle.join() {
                Ok(result) => (target_id, result),
                Err(_) => {
                    let err = EngineError::Worker {
                        target: target_id.clone(),
                    };
                    (target_id, Err(err))
                }
            })
            .collect()
    })
}
