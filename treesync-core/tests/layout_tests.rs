//! On-disk layout under ~/.treesync and config persistence.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use treesync_core::{config, layout, Backend, CoreError, SiteConfig};

#[test]
fn init_writes_config_under_root() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::init_at(home.path(), SiteConfig::new("me/blog", Backend::Local)).expect("init");

    home.child(".treesync/config.yaml")
        .assert(predicate::path::is_file())
        .assert(predicate::str::contains("repository: me/blog"))
        .assert(predicate::str::contains("backend: local"));
    home.child(".treesync/config.yaml.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn ensure_root_creates_dot_dir() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let root = layout::ensure_root(home.path()).expect("ensure root");

    assert_eq!(root, layout::root(home.path()));
    home.child(".treesync").assert(predicate::path::is_dir());
}

#[test]
fn corrupt_config_reports_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".treesync/config.yaml")
        .write_str("repository: [unclosed")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn token_is_not_written_when_absent() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &SiteConfig::new("me/blog", Backend::Github)).expect("save");
    let yaml = std::fs::read_to_string(config::config_path_at(home.path())).expect("read");
    assert!(!yaml.contains("token"), "got: {yaml}");
}
