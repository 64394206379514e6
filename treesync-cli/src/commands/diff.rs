//! `treesync diff`: show unified diffs for what an export would push.

use anyhow::{Context, Result};
use clap::Args;

use treesync_content::PostRenderer;
use treesync_core::{config, FsPostStore};
use treesync_remote::open_store;
use treesync_sync::diff_export;

use super::home_dir;

/// Arguments for `treesync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Only list the affected paths.
    #[arg(long)]
    pub stat: bool,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let site = config::load_at(&home).context("failed to load config: run `treesync init` first")?;
        let renderer = PostRenderer::new(&site).context("invalid path templates")?;
        let posts = FsPostStore::open_at(&home).context("failed to open post store")?;
        let remote = open_store(&home, &site).context("failed to open remote")?;

        let diffs = diff_export(&*remote, &posts, &renderer).context("diff failed")?;
        if diffs.is_empty() {
            println!("No differences for '{}'.", site.repository);
            return Ok(());
        }

        for diff in diffs {
            if self.stat {
                let marker = if diff.is_new() {
                    "A"
                } else if diff.is_move() {
                    "R"
                } else {
                    "M"
                };
                println!("{marker}  {}", diff.export_path);
                continue;
            }
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}
