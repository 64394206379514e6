//! `treesync status`: configuration, last sync outcome and per-post state.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use treesync_core::{config, FsPostStore, Post, PostStore, SiteConfig, SyncState};
use treesync_sync::{lock, state};

use super::home_dir;

/// Arguments for `treesync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let site = config::load_at(&home).context("failed to load config: run `treesync init` first")?;
        let report = build_report(&home, &site)?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&site, report);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusReport {
    repository: String,
    branch: String,
    backend: String,
    locked: bool,
    push_lock_held: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    push_lock_holder: Option<u32>,
    state: SyncState,
    posts: Vec<PostStatusJson>,
}

#[derive(Serialize)]
struct PostStatusJson {
    id: u64,
    title: String,
    status: String,
    remote_path: Option<String>,
    content_hash: Option<String>,
}

#[derive(Tabled)]
struct PostTableRow {
    #[tabled(rename = "")]
    indicator: String,
    id: u64,
    title: String,
    #[tabled(rename = "remote path")]
    remote_path: String,
}

fn build_report(home: &Path, site: &SiteConfig) -> Result<StatusReport> {
    let store = FsPostStore::open_at(home).context("failed to open post store")?;
    let posts = store.list().context("failed to list posts")?;
    let sync_state = state::load_at(home).context("failed to load sync state")?;

    Ok(StatusReport {
        repository: site.repository.clone(),
        branch: site.branch.clone(),
        backend: super::super::BackendArg(site.backend).to_string(),
        locked: lock::locked(home, site),
        push_lock_held: lock::is_held_at(home),
        push_lock_holder: lock::holder_pid_at(home),
        state: sync_state,
        posts: posts.into_iter().map(post_json).collect(),
    })
}

fn post_json(post: Post) -> PostStatusJson {
    PostStatusJson {
        id: post.id.0,
        title: post.title,
        status: post.status.to_string(),
        remote_path: post.remote_path,
        content_hash: post.content_hash.map(|h| h.to_string()),
    }
}

fn print_table(site: &SiteConfig, report: StatusReport) {
    let exported = report
        .posts
        .iter()
        .filter(|p| p.content_hash.is_some())
        .count();
    println!(
        "treesync v{} | {} @ {} | {} posts | {} exported",
        env!("CARGO_PKG_VERSION"),
        site.repository,
        site.branch,
        report.posts.len(),
        exported,
    );

    let separator = "■".repeat(60).bright_black().to_string();
    println!("{separator}");
    let last = match (&report.state.last_error, &report.state.last_status) {
        (Some(err), _) => format!("{} {err}", "error:".red().bold()),
        (None, Some(status)) => status.clone(),
        (None, None) => "never synced".to_string(),
    };
    println!("Last sync: {last}");
    if let Some(at) = report.state.updated_at {
        println!("       at: {} ({})", at.to_rfc3339(), format_age(at));
    }
    if report.state.fully_exported {
        println!("Full export: {}", "done".green());
    }
    if report.push_lock_held {
        let holder = report
            .push_lock_holder
            .map(|pid| format!(" (pid {pid})"))
            .unwrap_or_default();
        println!("{} push lock held by a running export{holder}", "■".yellow().bold());
    } else if report.locked {
        println!(
            "{} exports disabled: repository or token missing",
            "■".red().bold()
        );
    }
    println!("{separator}");

    if report.posts.is_empty() {
        println!("No posts.");
        return;
    }
    let rows: Vec<PostTableRow> = report
        .posts
        .into_iter()
        .map(|p| PostTableRow {
            indicator: if p.content_hash.is_some() {
                "■".green().bold().to_string()
            } else {
                "■".bright_black().bold().to_string()
            },
            id: p.id,
            title: p.title,
            remote_path: p.remote_path.unwrap_or_else(|| "never exported".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn format_age(at: DateTime<Utc>) -> String {
    let secs = (Utc::now() - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn age_buckets() {
        let now = Utc::now();
        assert_eq!(format_age(now + Duration::seconds(30)), "0s ago");
        assert_eq!(format_age(now - Duration::minutes(5)), "5m ago");
        assert_eq!(format_age(now - Duration::hours(3)), "3h ago");
        assert_eq!(format_age(now - Duration::days(2)), "2d ago");
    }
}
