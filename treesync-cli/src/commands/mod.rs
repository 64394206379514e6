pub mod daemon;
pub mod diff;
pub mod export;
pub mod import;
pub mod init;
pub mod post;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}
