mod cmd_apply;
mod cmd_diff;
mod cmd_fetch;
mod cmd_push;
mod cmd_refs;
mod cmd_scan;
mod cmd_status;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "regen")]
#[command(about = "Regenerate code from an API description without losing hand-written edits")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository root (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply freshly generated output to a target, merging hand edits
    Apply {
        /// Target to regenerate
        #[arg(long)]
        target: String,

        /// Output directory (overrides the regen.json manifest)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Directory holding the generator's staged output
        #[arg(long)]
        from: PathBuf,

        /// Publish the provenance ref after committing (best effort)
        #[arg(long)]
        push: bool,

        /// Remote to fetch from / push to
        #[arg(long)]
        remote: Option<String>,

        /// Exit non-zero when the merge left conflict markers behind
        #[arg(long)]
        fail_on_conflict: bool,
    },
    /// Scan a directory for generated-id markers
    Scan {
        /// Directory to scan
        #[arg(long)]
        dir: PathBuf,
    },
    /// Show each target's sync state and local drift from pristine
    Status {
        /// Limit to one target
        #[arg(long)]
        target: Option<String>,

        /// Remote to probe
        #[arg(long)]
        remote: Option<String>,
    },
    /// Diff a target's working files against its pristine snapshot
    Diff {
        /// Target to diff
        #[arg(long)]
        target: String,

        /// Limit to one file (path relative to the output directory)
        #[arg(long)]
        path: Option<String>,
    },
    /// List provenance refs
    Refs {
        /// Show each ref's snapshot history
        #[arg(long)]
        log: bool,
    },
    /// Fetch a target's provenance ref from the remote
    Fetch {
        target: String,

        /// Remote to fetch from
        #[arg(long)]
        remote: Option<String>,
    },
    /// Push a target's provenance ref to the remote
    Push {
        target: String,

        /// Remote to push to
        #[arg(long)]
        remote: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let repo_root = cli.repo.unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Apply {
            target,
            out_dir,
            from,
            push,
            remote,
            fail_on_conflict,
        } => cmd_apply::run(
            &repo_root,
            &target,
            out_dir,
            &from,
            push,
            remote,
            fail_on_conflict,
            cli.json,
        ),
        Commands::Scan { dir } => cmd_scan::run(&dir, cli.json),
        Commands::Status { target, remote } => {
            cmd_status::run(&repo_root, target.as_deref(), remote, cli.json)
        }
        Commands::Diff { target, path } => {
            cmd_diff::run(&repo_root, &target, path.as_deref())
        }
        Commands::Refs { log } => cmd_refs::run(&repo_root, log, cli.json),
        Commands::Fetch { target, remote } => cmd_fetch::run(&repo_root, &target, remote),
        Commands::Push { target, remote } => cmd_push::run(&repo_root, &target, remote),
    }
}
