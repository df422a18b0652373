use anyhow::Result;
use regen_git::{ProvenanceStore, PushOutcome, SyncOptions, gen_ref, publish_ref};
use std::path::Path;

pub fn run(repo_root: &Path, target_id: &str, remote: Option<String>) -> Result<()> {
    let store = ProvenanceStore::open(repo_root)?;
    let opts = SyncOptions {
        remote: remote.unwrap_or_else(|| "origin".to_string()),
        ..SyncOptions::default()
    };

    match publish_ref(&store, target_id, &opts) {
        PushOutcome::Pushed => {
            println!("pushed {} to '{}'", gen_ref(target_id), opts.remote);
        }
        PushOutcome::Skipped(reason) => {
            // Best effort: the local ref stays authoritative for this machine
            eprintln!("Warning: push of {} skipped: {reason}", gen_ref(target_id));
        }
    }
    Ok(())
}
