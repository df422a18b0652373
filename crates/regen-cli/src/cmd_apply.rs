use anyhow::{Context, Result, bail};
use regen::Target;
use regen_git::{FileOutcome, RegenOptions, TargetReport, read_staged_tree, regenerate_target};
use std::path::{Path, PathBuf};

use crate::config;

#[allow(clippy::too_many_arguments)]
pub fn run(
    repo_root: &Path,
    target_id: &str,
    out_dir: Option<PathBuf>,
    from: &Path,
    push: bool,
    remote: Option<String>,
    fail_on_conflict: bool,
    json: bool,
) -> Result<()> {
    let target = match out_dir {
        Some(dir) => Target::new(target_id, repo_root.join(dir)),
        None => config::find_target(repo_root, target_id)?,
    };

    let fresh = read_staged_tree(from)?;
    let opts = RegenOptions {
        remote: remote.unwrap_or_else(|| "origin".to_string()),
        push,
        ..RegenOptions::default()
    };

    let report = regenerate_target(repo_root, &target, fresh, &opts)
        .with_context(|| format!("regeneration of target '{target_id}' failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if fail_on_conflict && report.has_conflicts() {
        bail!(
            "{} file(s) left with conflict markers in target '{}'",
            report.conflicted_files(),
            report.target_id
        );
    }
    Ok(())
}

fn print_report(report: &TargetReport) {
    for file in &report.files {
        println!("{}", outcome_line(file));
    }
    println!(
        "target {}: {} file(s), {} conflict(s) -> {} @ {}",
        report.target_id,
        report.files.len(),
        report.conflicted_files(),
        regen_git::gen_ref(&report.target_id),
        config::short_hex(&report.commit),
    );
}

fn outcome_line(outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Written { path } => format!("  written    {path}"),
        FileOutcome::Merged { path, moved_from } => match moved_from {
            Some(from) => format!("  merged     {path} (moved from {from})"),
            None => format!("  merged     {path}"),
        },
        FileOutcome::Conflicted {
            path,
            moved_from,
            regions,
        } => {
            let lines: Vec<String> = regions
                .iter()
                .map(|r| format!("{}-{}", r.start_line, r.end_line))
                .collect();
            match moved_from {
                Some(from) => format!(
                    "  conflict   {path} (moved from {from}; lines {})",
                    lines.join(", ")
                ),
                None => format!("  conflict   {path} (lines {})", lines.join(", ")),
            }
        }
        FileOutcome::Untracked { path } => format!("  untracked  {path}"),
        FileOutcome::Deleted { path } => format!("  deleted    {path}"),
        FileOutcome::PreservedEdit { path } => {
            format!("  kept       {path} (hand-edited; generator removed it)")
        }
    }
}
