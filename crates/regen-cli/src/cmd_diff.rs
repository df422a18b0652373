use anyhow::{Context, Result};
use regen::scan::{ScanResult, Scanner};
use regen_git::ProvenanceStore;
use similar::TextDiff;
use std::path::Path;

use crate::config;

pub fn run(repo_root: &Path, target_id: &str, path_filter: Option<&str>) -> Result<()> {
    let target = config::find_target(repo_root, target_id)?;
    let store = ProvenanceStore::open(repo_root)?;
    let index = store
        .pristine_index(target_id)?
        .with_context(|| format!("target '{target_id}' has no pristine snapshot yet"))?;

    let scan = if target.out_dir.is_dir() {
        Scanner::new(&target.out_dir).scan()?
    } else {
        ScanResult::default()
    };

    let mut entries: Vec<_> = index.iter().collect();
    entries.sort_by(|a, b| a.1.path.cmp(&b.1.path));

    for (uuid, entry) in entries {
        let current = match scan.uuid_to_path.get(uuid) {
            Some(path) => path.clone(),
            None => entry.path.clone(),
        };
        if let Some(filter) = path_filter
            && current != filter
            && entry.path != filter
        {
            continue;
        }

        let pristine = store.blob_content(entry.blob)?;
        let working = std::fs::read(target.out_dir.join(&current)).unwrap_or_default();
        if pristine == working {
            continue;
        }

        let diff = unified_diff(
            &String::from_utf8_lossy(&pristine),
            &String::from_utf8_lossy(&working),
            &entry.path,
            &current,
        );
        print!("{diff}");
    }
    Ok(())
}

fn unified_diff(pristine: &str, working: &str, pristine_path: &str, working_path: &str) -> String {
    TextDiff::from_lines(pristine, working)
        .unified_diff()
        .context_radius(3)
        .header(
            &format!("pristine/{pristine_path}"),
            &format!("working/{working_path}"),
        )
        .to_string()
}
