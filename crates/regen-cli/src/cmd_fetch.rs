use anyhow::Result;
use regen_git::{ProvenanceStore, RefAvailability, SyncOptions, ensure_ref_available, gen_ref};
use std::path::Path;

pub fn run(repo_root: &Path, target_id: &str, remote: Option<String>) -> Result<()> {
    let store = ProvenanceStore::open(repo_root)?;
    let opts = SyncOptions {
        remote: remote.unwrap_or_else(|| "origin".to_string()),
        ..SyncOptions::default()
    };

    match ensure_ref_available(&store, target_id, &opts) {
        RefAvailability::Local => {
            println!("{} already available locally", gen_ref(target_id));
        }
        RefAvailability::Fetched => {
            println!("fetched {} from '{}'", gen_ref(target_id), opts.remote);
        }
        RefAvailability::Unavailable(reason) => {
            // Same healer semantics as a generation run: report, don't fail
            eprintln!("Warning: {} unavailable: {reason}", gen_ref(target_id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fetch_without_remote_warns_but_succeeds() {
        let dir = TempDir::new().unwrap();
        ProvenanceStore::init(dir.path()).unwrap();
        run(dir.path(), "go", None).unwrap();
    }

    #[test]
    fn test_fetch_with_local_ref() {
        let dir = TempDir::new().unwrap();
        let store = ProvenanceStore::init(dir.path()).unwrap();
        let mut files = std::collections::BTreeMap::new();
        files.insert(
            "a.go".to_string(),
            b"// @generated-id: aaaaaaaaaaaa\nv1\n".to_vec(),
        );
        store.commit_pristine("go", &files).unwrap();
        run(dir.path(), "go", None).unwrap();
    }
}
