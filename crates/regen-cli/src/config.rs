use anyhow::{Context, Result};
use regen::Target;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Target manifest at the repository root.
pub const MANIFEST_NAME: &str = "regen.json";

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub targets: Vec<ManifestTarget>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestTarget {
    pub id: String,
    /// Output directory, relative to the repository root.
    pub out_dir: PathBuf,
}

/// Load the manifest and resolve each target's output directory against the
/// repository root.
pub fn load_targets(repo_root: &Path) -> Result<Vec<Target>> {
    let manifest_path = repo_root.join(MANIFEST_NAME);
    let data = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    let manifest: Manifest = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", manifest_path.display()))?;
    Ok(manifest
        .targets
        .into_iter()
        .map(|t| Target::new(t.id, repo_root.join(t.out_dir)))
        .collect())
}

/// Look up one target from the manifest.
pub fn find_target(repo_root: &Path, id: &str) -> Result<Target> {
    let targets = load_targets(repo_root)?;
    targets
        .into_iter()
        .find(|t| t.id == id)
        .with_context(|| format!("target '{id}' not found in {MANIFEST_NAME}"))
}

/// First 8 characters of a hex id, for display.
pub fn short_hex(hex: &str) -> &str {
    &hex[..hex.len().min(8)]
}
