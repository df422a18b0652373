use anyhow::Result;
use regen_git::ProvenanceStore;
use serde::Serialize;
use std::path::Path;

use crate::config::short_hex;

#[derive(Debug, Serialize)]
struct RefListing {
    name: String,
    target_id: String,
    commit: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    commit: String,
    summary: String,
}

pub fn run(repo_root: &Path, log: bool, json: bool) -> Result<()> {
    let store = ProvenanceStore::open(repo_root)?;
    let mut listings = Vec::new();

    for info in store.list_refs()? {
        let history = if log {
            let mut entries = Vec::new();
            for oid in store.history(&info.target_id)? {
                let commit = store.repo().find_commit(oid)?;
                let summary = commit.summary().unwrap_or("").to_string();
                entries.push(HistoryEntry {
                    commit: oid.to_string(),
                    summary,
                });
            }
            entries
        } else {
            Vec::new()
        };
        listings.push(RefListing {
            name: info.name,
            target_id: info.target_id,
            commit: info.commit.to_string(),
            history,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    if listings.is_empty() {
        println!("No provenance refs.");
        return Ok(());
    }
    for listing in &listings {
        println!("{}  {}", short_hex(&listing.commit), listing.name);
        for entry in &listing.history {
            println!("    {}  {}", short_hex(&entry.commit), entry.summary);
        }
    }
    Ok(())
}
