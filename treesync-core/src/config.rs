//! Site configuration persisted at `<home>/.treesync/config.yaml`.
//!
//! Follows the same `fn_at(home, …)` / `fn(…)` split as [`crate::posts`]:
//! tests always call the `_at` forms with a `TempDir` home.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::layout;

/// Environment variable that overrides the configured API token.
pub const TOKEN_ENV: &str = "TREESYNC_TOKEN";

/// Default GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default tracked branch.
pub const DEFAULT_BRANCH: &str = "master";

/// Which object store implementation backs the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Github,
    /// JSON-file object store under `<home>/.treesync/remote.json`.
    Local,
}

/// Settings for one synchronized site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// `owner/name` of the remote repository.
    #[serde(default)]
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub site_url: String,
    #[serde(default)]
    pub site_name: String,
    /// Per-post-type overrides of the export path template.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub path_templates: BTreeMap<String, String>,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl SiteConfig {
    pub fn new(repository: impl Into<String>, backend: Backend) -> Self {
        Self {
            repository: repository.into(),
            branch: default_branch(),
            token: None,
            backend,
            api_url: default_api_url(),
            site_url: String::new(),
            site_name: String::new(),
            path_templates: BTreeMap::new(),
        }
    }

    /// Token from `$TREESYNC_TOKEN`, falling back to the configured one.
    pub fn token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone().filter(|t| !t.is_empty()))
    }

    /// `true` when exports cannot run: repository unset, or the GitHub
    /// backend has no token.
    pub fn missing_credentials(&self) -> bool {
        if self.repository.trim().is_empty() {
            return true;
        }
        self.backend == Backend::Github && self.token().is_none()
    }

    /// Split `owner/name`.
    pub fn owner_and_name(&self) -> Result<(&str, &str), CoreError> {
        match self.repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((owner, name))
            }
            _ => Err(CoreError::InvalidConfig(format!(
                "repository must be 'owner/name', got '{}'",
                self.repository
            ))),
        }
    }

    /// Case-insensitive comparison against a notification's `full_name`.
    pub fn matches_repository(&self, full_name: &str) -> bool {
        self.repository.eq_ignore_ascii_case(full_name)
    }
}

/// `<home>/.treesync/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    layout::root(home).join("config.yaml")
}

/// Load the site configuration. `ConfigNotFound` if `init` never ran.
pub fn load_at(home: &Path) -> Result<SiteConfig, CoreError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(CoreError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SiteConfig, CoreError> {
    load_at(&layout::home()?)
}

/// Atomically save the configuration (`.tmp` sibling, `0600`, rename).
pub fn save_at(home: &Path, config: &SiteConfig) -> Result<(), CoreError> {
    layout::ensure_root(home)?;
    let path = config_path_at(home);
    let yaml = serde_yaml::to_string(config)?;
    layout::write_atomic(&path, yaml.as_bytes())
}

/// Write `config` unless one already exists; returns the effective config.
pub fn init_at(home: &Path, config: SiteConfig) -> Result<SiteConfig, CoreError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    config.owner_and_name()?;
    save_at(home, &config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_is_reported() {
        let home = TempDir::new().unwrap();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigNotFound { .. }));
    }

    #[test]
    fn init_is_idempotent() {
        let home = TempDir::new().unwrap();
        let first = init_at(home.path(), SiteConfig::new("me/blog", Backend::Local)).unwrap();
        let second = init_at(home.path(), SiteConfig::new("other/site", Backend::Local)).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.repository, "me/blog");
    }

    #[test]
    fn init_rejects_malformed_repository() {
        let home = TempDir::new().unwrap();
        let err = init_at(home.path(), SiteConfig::new("no-slash", Backend::Local)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: SiteConfig = serde_yaml::from_str("repository: me/blog\n").unwrap();
        assert_eq!(cfg.branch, "master");
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.backend, Backend::Github);
    }

    #[test]
    fn local_backend_needs_no_token() {
        let cfg = SiteConfig::new("me/blog", Backend::Local);
        assert!(!cfg.missing_credentials());
        let unset = SiteConfig::new("", Backend::Local);
        assert!(unset.missing_credentials());
    }

    #[test]
    fn repository_match_ignores_case() {
        let cfg = SiteConfig::new("Me/Blog", Backend::Local);
        assert!(cfg.matches_repository("me/blog"));
        assert!(!cfg.matches_repository("me/other"));
    }
}
