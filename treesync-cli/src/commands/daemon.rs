//! `treesync daemon`: background watcher lifecycle.

use anyhow::{Context, Result};
use clap::Subcommand;

use treesync_daemon::paths::socket_path;
use treesync_daemon::{request_export, request_status, request_stop, start_blocking, DaemonError};
use treesync_core::PostId;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run daemon in foreground (post watcher + socket server).
    Start,
    /// Request graceful daemon shutdown over Unix socket.
    Stop,
    /// Query daemon runtime status over Unix socket.
    Status,
    /// Ask the running daemon to export everything, or one post.
    Export {
        #[arg(long)]
        post: Option<u64>,
    },
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = super::home_dir()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let payload = match request_status(&home) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Export { post } => {
            let summary = request_export(&home, post.map(PostId))
                .context("daemon export request failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .context("failed to render export summary JSON")?
            );
        }
    }

    Ok(())
}
