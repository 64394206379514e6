//! `treesync export`: push local posts to the remote as one commit.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use treesync_core::PostId;
use treesync_sync::{run_export, ExportOutcome, ExportScope};

use super::home_dir;

/// Arguments for `treesync export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Export only this post.
    #[arg(long, conflicts_with = "delete")]
    pub post: Option<u64>,

    /// Remove this post from the remote, then delete it locally.
    #[arg(long)]
    pub delete: Option<u64>,
}

impl ExportArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let scope = match (self.post, self.delete) {
            (Some(id), _) => ExportScope::Post(PostId(id)),
            (None, Some(id)) => ExportScope::Delete(PostId(id)),
            (None, None) => ExportScope::All,
        };
        let outcome = run_export(&home, scope).context("export failed")?;
        print_outcome(&outcome);

        if let ExportOutcome::Errored { step, .. } = outcome {
            anyhow::bail!("export stopped at '{step}'");
        }
        Ok(())
    }
}

fn print_outcome(outcome: &ExportOutcome) {
    match outcome {
        ExportOutcome::NoChange => println!("✓ Nothing to export"),
        ExportOutcome::Committed {
            commit, write_back, ..
        } => {
            println!(
                "{} {} {}",
                "✓".green().bold(),
                "Committed".bold(),
                commit.hash.as_str().get(..12).unwrap_or(commit.hash.as_str())
            );
            println!("  {}", commit.message);
            for id in &write_back.updated {
                println!("  ✎  post {id}");
            }
            for id in &write_back.unmatched {
                println!("  {}  post {id} (no blob matched its hash)", "?".yellow());
            }
            for skipped in &write_back.skipped {
                println!("  {}  post {} skipped: {}", "!".yellow(), skipped.id, skipped.reason);
            }
        }
        ExportOutcome::Errored { message, .. } => {
            eprintln!("{} {message}", "✗".red().bold());
        }
        ExportOutcome::Locked => {
            println!(
                "{} export skipped: another export holds the push lock, or credentials are missing",
                "■".yellow().bold()
            );
        }
    }
}
