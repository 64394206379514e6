//! treesync: keep a set of posts in sync with a git repository tree.
//!
//! # Usage
//!
//! ```text
//! treesync init <owner/name> [--backend github|local] [--branch <b>] [--site-url <url>]
//! treesync post list|add|show|remove
//! treesync export [--post <id> | --delete <id>]
//! treesync import <notification.json | ->
//! treesync status [--json]
//! treesync diff
//! treesync daemon start|stop|status
//! ```

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, diff::DiffArgs, export::ExportArgs, import::ImportArgs,
    init::InitArgs, post::PostCommand, status::StatusArgs,
};
use treesync_core::Backend;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "treesync",
    version,
    about = "Synchronize posts with a remote git tree",
    long_about = None,
)]
struct Cli {
    /// Log verbosity: -v for info, -vv for debug.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the site configuration.
    Init(InitArgs),

    /// Manage local posts.
    Post {
        #[command(subcommand)]
        command: PostCommand,
    },

    /// Push local posts to the remote as one commit.
    Export(ExportArgs),

    /// Apply a change notification from the remote.
    Import(ImportArgs),

    /// Show configuration, last sync outcome and per-post sync state.
    Status(StatusArgs),

    /// Show unified diff of what an export would change.
    Diff(DiffArgs),

    /// Run or control the background sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared Backend argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `Backend` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendArg(pub Backend);

impl FromStr for BackendArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self(Backend::Github)),
            "local" => Ok(Self(Backend::Local)),
            other => Err(format!(
                "unknown backend '{other}'; expected: github, local"
            )),
        }
    }
}

impl fmt::Display for BackendArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Backend::Github => f.write_str("github"),
            Backend::Local => f.write_str("local"),
        }
    }
}

impl From<BackendArg> for Backend {
    fn from(b: BackendArg) -> Self {
        b.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // The daemon installs its own subscriber.
    if !matches!(cli.command, Commands::Daemon { .. }) {
        init_tracing(cli.verbose);
    }
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Post { command } => commands::post::run(command),
        Commands::Export(args) => args.run(),
        Commands::Import(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
