use anyhow::Result;
use regen::scan::{ChangeSummary, ScanResult, Scanner, diff_records};
use regen::{GeneratedFileRecord, Target};
use regen_git::{ProvenanceStore, SyncOptions, SyncState, probe_state};
use serde::Serialize;
use std::path::Path;

use crate::config;

#[derive(Debug, Serialize)]
struct TargetStatus {
    target_id: String,
    state: SyncState,
    tracked: usize,
    deleted: Vec<String>,
    moved: Vec<(String, String)>,
    modified: Vec<String>,
}

pub fn run(
    repo_root: &Path,
    target_id: Option<&str>,
    remote: Option<String>,
    json: bool,
) -> Result<()> {
    let targets = match target_id {
        Some(id) => vec![config::find_target(repo_root, id)?],
        None => config::load_targets(repo_root)?,
    };

    let store = ProvenanceStore::open(repo_root)?;
    let sync_opts = SyncOptions {
        remote: remote.unwrap_or_else(|| "origin".to_string()),
        ..SyncOptions::default()
    };

    let mut statuses = Vec::new();
    for target in &targets {
        statuses.push(target_status(&store, target, &sync_opts)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    for status in &statuses {
        println!(
            "{}: {} ({} tracked file(s))",
            status.target_id,
            state_label(status.state),
            status.tracked
        );
        let summary = ChangeSummary {
            deleted: status.deleted.clone(),
            moved: status.moved.clone(),
            modified: status.modified.clone(),
        };
        if !summary.is_empty() {
            println!("{}", summary.format(10));
        }
    }
    Ok(())
}

fn target_status(
    store: &ProvenanceStore,
    target: &Target,
    sync_opts: &SyncOptions,
) -> Result<TargetStatus> {
    let state = probe_state(store, &target.id, sync_opts);
    let index = store.pristine_index(&target.id)?;

    let scan = if target.out_dir.is_dir() {
        Scanner::new(&target.out_dir).scan()?
    } else {
        ScanResult::default()
    };

    let (tracked, mut summary, modified) = match &index {
        Some(index) => {
            let records: Vec<GeneratedFileRecord> = index
                .iter()
                .map(|(uuid, entry)| GeneratedFileRecord {
                    uuid: uuid.clone(),
                    path: entry.path.clone(),
                    target_id: target.id.clone(),
                })
                .collect();
            let summary = diff_records(&records, &scan);

            // Content drift for files still at a known location
            let mut modified = Vec::new();
            for (uuid, entry) in index.iter() {
                if let Some(current) = scan.uuid_to_path.get(uuid) {
                    let on_disk = std::fs::read(target.out_dir.join(current)).unwrap_or_default();
                    if on_disk != store.blob_content(entry.blob)? {
                        modified.push(current.clone());
                    }
                }
            }
            modified.sort();
            (index.len(), summary, modified)
        }
        None => (0, ChangeSummary::default(), Vec::new()),
    };
    summary.modified = modified;

    Ok(TargetStatus {
        target_id: target.id.clone(),
        state,
        tracked,
        deleted: summary.deleted,
        moved: summary.moved,
        modified: summary.modified,
    })
}

fn state_label(state: SyncState) -> &'static str {
    match state {
        SyncState::Absent => "absent (never generated)",
        SyncState::LocalOnly => "local only",
        SyncState::Synced => "synced",
        SyncState::Stale => "stale (remote has advanced)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn snapshot_with(id: &str, path: &str, body: &str) -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        files.insert(
            path.to_string(),
            format!("// @generated-id: {id}\n{body}").into_bytes(),
        );
        files
    }

    #[test]
    fn test_status_absent_target() {
        let dir = TempDir::new().unwrap();
        let store = ProvenanceStore::init(dir.path()).unwrap();
        let target = Target::new("go", dir.path().join("sdk"));
        let status = target_status(&store, &target, &SyncOptions::default()).unwrap();
        assert_eq!(status.state, SyncState::Absent);
        assert_eq!(status.tracked, 0);
    }

    #[test]
    fn test_status_reports_modification() {
        let dir = TempDir::new().unwrap();
        let store = ProvenanceStore::init(dir.path()).unwrap();
        let target = Target::new("go", dir.path().join("sdk"));

        let files = snapshot_with("aaaaaaaaaaaa", "client.go", "v1\n");
        store.commit_pristine("go", &files).unwrap();
        std::fs::create_dir_all(&target.out_dir).unwrap();
        std::fs::write(
            target.out_dir.join("client.go"),
            files["client.go"].clone(),
        )
        .unwrap();

        // No drift yet
        let status = target_status(&store, &target, &SyncOptions::default()).unwrap();
        assert_eq!(status.tracked, 1);
        assert!(status.modified.is_empty());

        // Edit the file
        let mut edited = files["client.go"].clone();
        edited.extend_from_slice(b"// note\n");
        std::fs::write(target.out_dir.join("client.go"), edited).unwrap();

        let status = target_status(&store, &target, &SyncOptions::default()).unwrap();
        assert_eq!(status.modified, vec!["client.go".to_string()]);
        assert_eq!(status.state, SyncState::LocalOnly);
    }

    #[test]
    fn test_status_reports_deleted_and_moved() {
        let dir = TempDir::new().unwrap();
        let store = ProvenanceStore::init(dir.path()).unwrap();
        let target = Target::new("go", dir.path().join("sdk"));

        let mut files = snapshot_with("aaaaaaaaaaaa", "gone.go", "x\n");
        files.extend(snapshot_with("bbbbbbbbbbbb", "old.go", "y\n"));
        store.commit_pristine("go", &files).unwrap();

        std::fs::create_dir_all(&target.out_dir).unwrap();
        // gone.go never written to disk; old.go lives at a new path
        std::fs::write(target.out_dir.join("renamed.go"), files["old.go"].clone()).unwrap();

        let status = target_status(&store, &target, &SyncOptions::default()).unwrap();
        assert_eq!(status.deleted, vec!["gone.go".to_string()]);
        assert_eq!(
            status.moved,
            vec![("old.go".to_string(), "renamed.go".to_string())]
        );
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(state_label(SyncState::Synced), "synced");
        assert!(state_label(SyncState::Stale).contains("stale"));
    }
}
