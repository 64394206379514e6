//! `treesync init <owner/name> [--backend ...] [--branch ...]`

use anyhow::{Context, Result};
use clap::Args;

use treesync_core::{config, layout, SiteConfig};

use super::super::BackendArg;
use super::home_dir;

/// Write `~/.treesync/config.yaml`. An existing configuration is kept.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Remote repository as `owner/name`.
    pub repository: String,

    /// Object store backend: github | local.
    #[arg(long, short = 'b', default_value = "github")]
    pub backend: BackendArg,

    /// Branch to export to and import from.
    #[arg(long)]
    pub branch: Option<String>,

    /// Public URL of the site; imported permalinks under it become relative.
    #[arg(long)]
    pub site_url: Option<String>,

    /// Site name used in commit messages.
    #[arg(long)]
    pub site_name: Option<String>,

    /// API token. Prefer `$TREESYNC_TOKEN` over storing it.
    #[arg(long)]
    pub token: Option<String>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let already = config::config_path_at(&home).exists();

        let mut site = SiteConfig::new(self.repository.clone(), self.backend.into());
        if let Some(branch) = self.branch {
            site.branch = branch;
        }
        site.site_url = self.site_url.unwrap_or_default();
        site.site_name = self.site_name.unwrap_or_default();
        site.token = self.token;

        let site = config::init_at(&home, site)
            .with_context(|| format!("failed to init site for '{}'", self.repository))?;
        layout::ensure_root(&home).context("failed to create ~/.treesync")?;

        if already {
            println!(
                "✓ Already initialized for '{}' (branch {})",
                site.repository, site.branch
            );
        } else {
            println!(
                "✓ Initialized '{}' (branch {}, backend {})",
                site.repository,
                site.branch,
                BackendArg(site.backend)
            );
        }
        println!("  Config: {}", config::config_path_at(&home).display());
        Ok(())
    }
}
