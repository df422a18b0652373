//! The pristine snapshot store.
//!
//! One private ref per generation target, `refs/speakeasy/gen/<targetID>`,
//! pointing at a linear chain of commits whose trees are the byte-for-byte
//! as-generated output of each run. The chain is append-only: refs only
//! fast-forward, are never rewritten to unrelated commits, and are never
//! deleted in normal operation. Reachability from the ref is what keeps
//! every historical snapshot alive across `git gc`.

use git2::{Delta, ErrorCode, ObjectType, Oid, Repository, Signature, Tree, TreeWalkMode,
           TreeWalkResult};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regen::marker;

use crate::error::StoreError;

/// Ref namespace holding one snapshot chain per target. Not fetched by a
/// default `git clone`; transported with `<ref>:<ref>` refspecs.
pub const GEN_REF_PREFIX: &str = "refs/speakeasy/gen/";

/// Full ref name for a target's snapshot chain.
pub fn gen_ref(target_id: &str) -> String {
    format!("{GEN_REF_PREFIX}{target_id}")
}

/// Committer identity for snapshot commits.
const SNAPSHOT_SIGNATURE: (&str, &str) = ("regen", "regen@localhost");

/// A provenance store over one git repository.
///
/// The repository handle is explicit; nothing in this crate reads ambient
/// process state like the current directory. Handles are cheap to open;
/// concurrent workers each open their own.
pub struct ProvenanceStore {
    repo: Repository,
}

/// A single file resolved from a pristine snapshot.
#[derive(Debug, Clone)]
pub struct PristineFile {
    /// Path recorded in the snapshot tree (forward slashes).
    pub path: String,
    pub content: Vec<u8>,
}

/// The uuid index of one snapshot: everything needed to find each tracked
/// file's merge base without checking out a working tree.
#[derive(Debug)]
pub struct PristineIndex {
    /// The snapshot commit this index was built from.
    pub commit: Oid,
    by_uuid: HashMap<String, PristineEntry>,
}

#[derive(Debug, Clone)]
pub struct PristineEntry {
    pub path: String,
    pub blob: Oid,
}

impl PristineIndex {
    pub fn get(&self, uuid: &str) -> Option<&PristineEntry> {
        self.by_uuid.get(uuid)
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.by_uuid.contains_key(uuid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PristineEntry)> {
        self.by_uuid.iter()
    }

    pub fn len(&self) -> usize {
        self.by_uuid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uuid.is_empty()
    }
}

/// A provenance ref and the commit it points at.
#[derive(Debug, Clone)]
pub struct RefInfo {
    pub name: String,
    pub target_id: String,
    pub commit: Oid,
}

impl ProvenanceStore {
    /// Open the repository containing `path` (walks up to find `.git`).
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let repo = Repository::discover(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(ProvenanceStore { repo })
    }

    /// Initialize a new repository at `path` and open a store over it.
    pub fn init(path: &Path) -> Result<Self, StoreError> {
        let repo = Repository::init(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(ProvenanceStore { repo })
    }

    /// The underlying repository, for operations this store does not wrap.
    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// The tip commit of a target's snapshot chain, if the ref exists
    /// locally.
    pub fn ref_tip(&self, target_id: &str) -> Result<Option<Oid>, StoreError> {
        match self.repo.refname_to_id(&gen_ref(target_id)) {
            Ok(oid) => Ok(Some(oid)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(StoreError::Git(err)),
        }
    }

    /// Build the uuid index of a target's tip snapshot.
    ///
    /// Returns `None` when the target has no local ref (first generation,
    /// or a cold clone before healing). Matching is by embedded marker, so
    /// a file keeps its base across renames. Blobs missing from the local
    /// object database (partial clones) are skipped with a warning, and the
    /// affected files simply merge without a base.
    pub fn pristine_index(&self, target_id: &str) -> Result<Option<PristineIndex>, StoreError> {
        let Some(tip) = self.ref_tip(target_id)? else {
            return Ok(None);
        };
        let tree = self.repo.find_commit(tip)?.tree()?;

        let mut by_uuid = HashMap::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob)
                && let Some(name) = entry.name()
            {
                let path = format!("{root}{name}");
                match self.repo.find_blob(entry.id()) {
                    Ok(blob) => {
                        if let Some(uuid) = marker::extract_generated_id(blob.content()) {
                            by_uuid.insert(uuid, PristineEntry {
                                path,
                                blob: entry.id(),
                            });
                        }
                    }
                    Err(err) => {
                        eprintln!(
                            "Warning: pristine blob for {path} unavailable locally: {err}"
                        );
                    }
                }
            }
            TreeWalkResult::Ok
        })?;

        Ok(Some(PristineIndex {
            commit: tip,
            by_uuid,
        }))
    }

    /// Look up one file's pristine content by its generated-id.
    ///
    /// `Ok(None)` when the target has no local ref or the uuid is not in
    /// the tip snapshot (a newly added file).
    pub fn get_pristine(
        &self,
        target_id: &str,
        uuid: &str,
    ) -> Result<Option<PristineFile>, StoreError> {
        let Some(index) = self.pristine_index(target_id)? else {
            return Ok(None);
        };
        let Some(entry) = index.get(uuid) else {
            return Ok(None);
        };
        Ok(Some(PristineFile {
            path: entry.path.clone(),
            content: self.blob_content(entry.blob)?,
        }))
    }

    /// Raw blob content by id.
    pub fn blob_content(&self, oid: Oid) -> Result<Vec<u8>, StoreError> {
        Ok(self.repo.find_blob(oid)?.content().to_vec())
    }

    /// Commit a new pristine snapshot and fast-forward the target's ref.
    ///
    /// `files` maps relative paths (forward slashes) to as-generated bytes.
    /// The parent is the current ref tip (none on the first run); the ref
    /// update is compare-and-swap against that tip, so a concurrent writer
    /// on the same ref surfaces as [`StoreError::RefMoved`] instead of a
    /// silent overwrite.
    pub fn commit_pristine(
        &self,
        target_id: &str,
        files: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Oid, StoreError> {
        if files.is_empty() {
            return Err(StoreError::EmptySnapshot(target_id.to_string()));
        }

        let tree_oid = self.write_tree(files)?;
        let tree = self.repo.find_tree(tree_oid)?;
        let parent = self.ref_tip(target_id)?;
        let message = self.snapshot_message(target_id, parent, &tree)?;
        let sig = Signature::now(SNAPSHOT_SIGNATURE.0, SNAPSHOT_SIGNATURE.1)?;
        let refname = gen_ref(target_id);

        let commit = match parent {
            Some(parent_oid) => {
                let parent_commit = self.repo.find_commit(parent_oid)?;
                let commit =
                    self.repo
                        .commit(None, &sig, &sig, &message, &tree, &[&parent_commit])?;
                self.repo
                    .reference_matching(&refname, commit, true, parent_oid, &message)
                    .map_err(|err| ref_update_error(&refname, err))?;
                commit
            }
            None => {
                let commit = self.repo.commit(None, &sig, &sig, &message, &tree, &[])?;
                // force=false: creation fails if someone created the ref
                // since we read it as absent
                self.repo
                    .reference(&refname, commit, false, &message)
                    .map_err(|err| ref_update_error(&refname, err))?;
                commit
            }
        };

        Ok(commit)
    }

    /// All `refs/speakeasy/gen/*` refs, sorted by name.
    pub fn list_refs(&self) -> Result<Vec<RefInfo>, StoreError> {
        let mut refs = Vec::new();
        for reference in self.repo.references_glob(&format!("{GEN_REF_PREFIX}*"))? {
            let reference = reference?;
            if let (Some(name), Some(commit)) = (reference.name(), reference.target()) {
                let target_id = name
                    .strip_prefix(GEN_REF_PREFIX)
                    .unwrap_or(name)
                    .to_string();
                refs.push(RefInfo {
                    name: name.to_string(),
                    target_id,
                    commit,
                });
            }
        }
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(refs)
    }

    /// Snapshot commits for a target, tip first.
    pub fn history(&self, target_id: &str) -> Result<Vec<Oid>, StoreError> {
        let Some(tip) = self.ref_tip(target_id)? else {
            return Ok(Vec::new());
        };
        let mut walker = self.repo.revwalk()?;
        walker.push(tip)?;
        let mut commits = Vec::new();
        for oid in walker {
            commits.push(oid?);
        }
        Ok(commits)
    }

    /// Materialize a full snapshot as a path -> content map.
    pub fn read_snapshot(&self, commit: Oid) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        let tree = self.repo.find_commit(commit)?.tree()?;
        let mut files = BTreeMap::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob)
                && let Some(name) = entry.name()
                && let Ok(blob) = self.repo.find_blob(entry.id())
            {
                files.insert(format!("{root}{name}"), blob.content().to_vec());
            }
            TreeWalkResult::Ok
        })?;
        Ok(files)
    }

    // ── Tree construction ──────────────────────────────────────────────

    fn write_tree(&self, files: &BTreeMap<String, Vec<u8>>) -> Result<Oid, StoreError> {
        let mut root = DirNode::default();
        for (path, content) in files {
            let components: Vec<&str> =
                path.split('/').filter(|c| !c.is_empty()).collect();
            if components.is_empty() {
                continue;
            }
            root.insert(&components, content);
        }
        self.write_dir(&root)
    }

    fn write_dir(&self, dir: &DirNode<'_>) -> Result<Oid, StoreError> {
        let mut builder = self.repo.treebuilder(None)?;
        for (name, node) in &dir.entries {
            match node {
                Node::File(content) => {
                    let blob = self.repo.blob(content)?;
                    builder.insert(name, blob, entry_mode(name))?;
                }
                Node::Dir(sub) => {
                    let subtree = self.write_dir(sub)?;
                    builder.insert(name, subtree, 0o040000)?;
                }
            }
        }
        Ok(builder.write()?)
    }

    fn snapshot_message(
        &self,
        target_id: &str,
        parent: Option<Oid>,
        tree: &Tree<'_>,
    ) -> Result<String, StoreError> {
        let Some(parent) = parent else {
            return Ok(format!("regen({target_id}): initial snapshot"));
        };
        let parent_tree = self.repo.find_commit(parent)?.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&parent_tree), Some(tree), None)?;

        let (mut added, mut updated, mut removed) = (0usize, 0usize, 0usize);
        for delta in diff.deltas() {
            match delta.status() {
                Delta::Added => added += 1,
                Delta::Deleted => removed += 1,
                _ => updated += 1,
            }
        }

        let mut parts = Vec::new();
        if added > 0 {
            parts.push(format!("+{added} added"));
        }
        if updated > 0 {
            parts.push(format!("~{updated} updated"));
        }
        if removed > 0 {
            parts.push(format!("-{removed} removed"));
        }

        if parts.is_empty() {
            Ok(format!("regen({target_id}): no changes"))
        } else {
            Ok(format!("regen({target_id}): {}", parts.join(", ")))
        }
    }
}

fn ref_update_error(refname: &str, err: git2::Error) -> StoreError {
    match err.code() {
        ErrorCode::Modified | ErrorCode::Exists => StoreError::RefMoved(refname.to_string()),
        _ => StoreError::Git(err),
    }
}

/// Tree mode for a file entry; shell scripts and wrapper scripts keep their
/// executable bit.
fn entry_mode(name: &str) -> i32 {
    let executable = name.ends_with(".sh")
        || name.ends_with(".bash")
        || name.ends_with(".zsh")
        || name == "gradlew"
        || name == "mvnw";
    if executable { 0o100755 } else { 0o100644 }
}

#[derive(Default)]
struct DirNode<'a> {
    entries: BTreeMap<String, Node<'a>>,
}

enum Node<'a> {
    File(&'a [u8]),
    Dir(DirNode<'a>),
}

impl<'a> DirNode<'a> {
    fn insert(&mut self, components: &[&str], content: &'a [u8]) {
        match components {
            [] => {}
            [file] => {
                self.entries
                    .insert((*file).to_string(), Node::File(content));
            }
            [dir, rest @ ..] => {
                let node = self
                    .entries
                    .entry((*dir).to_string())
                    .or_insert_with(|| Node::Dir(DirNode::default()));
                if let Node::Dir(sub) = node {
                    sub.insert(rest, content);
                }
            }
        }
    }
}
