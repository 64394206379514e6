//! `treesync import <notification>`: apply a push notification.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use treesync_core::ChangeNotification;
use treesync_sync::{run_import, ImportOutcome, ImportReport, SkipReason};

use super::home_dir;

/// Arguments for `treesync import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Notification JSON file, or `-` for stdin.
    pub notification: PathBuf,
}

impl ImportArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let raw = if self.notification.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read notification from stdin")?;
            buf
        } else {
            std::fs::read_to_string(&self.notification).with_context(|| {
                format!("cannot read notification '{}'", self.notification.display())
            })?
        };
        let notification: ChangeNotification =
            serde_json::from_str(&raw).context("notification is not valid JSON")?;

        match run_import(&home, &notification).context("import failed")? {
            ImportOutcome::SelfAuthored => {
                println!("✓ Head commit was exported by treesync; nothing to import");
            }
            ImportOutcome::Rejected { reason } => {
                println!("{} notification ignored: {reason}", "■".yellow().bold());
            }
            ImportOutcome::Imported(report) => print_report(&report),
            ImportOutcome::Errored { message } => {
                eprintln!("{} {message}", "✗".red().bold());
                anyhow::bail!("import stopped");
            }
        }
        Ok(())
    }
}

fn print_report(report: &ImportReport) {
    let commit = report
        .commit
        .as_ref()
        .map(|c| c.as_str().get(..12).unwrap_or(c.as_str()).to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "✓ Imported {commit} ({} imported, {} deleted, {} skipped)",
        report.imported.len(),
        report.deleted.len(),
        report.skipped.len()
    );
    for id in &report.imported {
        println!("  ✎  post {id}");
    }
    for id in &report.deleted {
        println!("  ✗  post {id}");
    }
    for (path, reason) in &report.skipped {
        println!("  ·  {path} ({})", skip_detail(reason));
    }
    for path in &report.unresolved {
        println!("  {}  {path} removed remotely, no local post", "?".yellow());
    }
}

fn skip_detail(reason: &SkipReason) -> String {
    match reason {
        SkipReason::Readme => "readme".to_string(),
        SkipReason::KnownHash(id) => format!("unchanged, post {id}"),
        SkipReason::NoFrontMatter => "no front matter".to_string(),
        SkipReason::FetchFailed(e) => format!("fetch failed: {e}"),
        SkipReason::Undecodable(e) => format!("not UTF-8: {e}"),
        SkipReason::InvalidFrontMatter(e) => format!("invalid front matter: {e}"),
    }
}
