use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;

use treesync_core::{FsPostStore, PostId, PostStore};
use treesync_remote::{FileObjectStore, ObjectStore};

fn treesync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("treesync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("TREESYNC_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn init_local(home: &TempDir) {
    treesync_cmd(home.path())
        .args([
            "init",
            "me/blog",
            "--backend",
            "local",
            "--site-url",
            "https://blog.example.com",
            "--site-name",
            "My Blog",
        ])
        .assert()
        .success()
        .stdout(contains("Initialized 'me/blog'"));
}

fn add_post(home: &TempDir, title: &str, body: &str) {
    treesync_cmd(home.path())
        .args(["post", "add", "--title", title, "--body", body])
        .assert()
        .success()
        .stdout(contains("Added post"));
}

fn status_json(home: &TempDir) -> Value {
    let assert = treesync_cmd(home.path())
        .args(["status", "--json"])
        .assert()
        .success();
    serde_json::from_slice(&assert.get_output().stdout).expect("status JSON")
}

#[test]
fn init_twice_keeps_existing_config() {
    let home = TempDir::new().expect("home");
    init_local(&home);
    treesync_cmd(home.path())
        .args(["init", "someone/else", "--backend", "local"])
        .assert()
        .success()
        .stdout(contains("Already initialized for 'me/blog'"));
}

#[test]
fn unknown_backend_is_rejected() {
    let home = TempDir::new().expect("home");
    treesync_cmd(home.path())
        .args(["init", "me/blog", "--backend", "svn"])
        .assert()
        .failure()
        .stderr(contains("unknown backend 'svn'"));
}

#[test]
fn export_commits_once_then_reports_nothing_to_do() {
    let home = TempDir::new().expect("home");
    init_local(&home);
    add_post(&home, "Hello World", "First post.");

    treesync_cmd(home.path())
        .arg("export")
        .assert()
        .success()
        .stdout(contains("Committed"))
        .stdout(contains("Full export from treesync at My Blog - treesync"));

    treesync_cmd(home.path())
        .arg("export")
        .assert()
        .success()
        .stdout(contains("Nothing to export"));

    let store = FileObjectStore::open_at(home.path()).expect("remote");
    assert_eq!(store.inner().commit_count(), 1);

    let status = status_json(&home);
    assert_eq!(status["state"]["export_complete"], json!(true));
    assert_eq!(status["state"]["fully_exported"], json!(true));
    let post = &status["posts"][0];
    assert_eq!(post["title"], json!("Hello World"));
    assert!(post["content_hash"].is_string(), "hash written back: {post}");
    assert!(post["remote_path"]
        .as_str()
        .is_some_and(|p| p.starts_with("_posts/") && p.ends_with("-hello-world.md")));
}

#[test]
fn diff_shows_pending_post_until_exported() {
    let home = TempDir::new().expect("home");
    init_local(&home);
    add_post(&home, "Pending Post", "Not yet pushed.");

    treesync_cmd(home.path())
        .arg("diff")
        .assert()
        .success()
        .stdout(contains("/dev/null"))
        .stdout(contains("+post_title: Pending Post"));

    treesync_cmd(home.path()).arg("export").assert().success();

    treesync_cmd(home.path())
        .arg("diff")
        .assert()
        .success()
        .stdout(contains("No differences for 'me/blog'."));
}

#[test]
fn export_delete_removes_remote_file_and_local_post() {
    let home = TempDir::new().expect("home");
    init_local(&home);
    add_post(&home, "Short Lived", "Gone soon.");
    treesync_cmd(home.path()).arg("export").assert().success();

    let remote_path = {
        let store = FsPostStore::open_at(home.path()).expect("posts");
        store
            .get(PostId(1))
            .expect("get")
            .and_then(|p| p.remote_path)
            .expect("remote path recorded")
    };

    treesync_cmd(home.path())
        .args(["export", "--delete", "1"])
        .assert()
        .success()
        .stdout(contains("Deleted"));

    let store = FileObjectStore::open_at(home.path()).expect("remote");
    assert!(store.inner().read_head_file(&remote_path).is_none());
    let posts = FsPostStore::open_at(home.path()).expect("posts");
    assert!(posts.list().expect("list").is_empty());
}

#[test]
fn import_applies_remote_commit() {
    let home = TempDir::new().expect("home");
    init_local(&home);

    let commit = {
        let mut store = FileObjectStore::open_at(home.path()).expect("remote");
        store
            .commit_files(
                &[
                    (
                        "_posts/2024-03-01-from-remote.md",
                        "---\npost_title: From Remote\npost_date: '2024-03-01 10:00:00'\npermalink: https://blog.example.com/from-remote/\n---\nWritten elsewhere.\n",
                    ),
                    ("README.md", "# site\n"),
                ],
                "Edit on the web",
            )
            .expect("commit")
    };

    let notification = json!({
        "repository": { "full_name": "Me/Blog" },
        "ref": "refs/heads/master",
        "head_commit": { "id": commit.hash.as_str(), "message": "Edit on the web" },
        "commits": [{ "id": commit.hash.as_str(), "added": ["_posts/2024-03-01-from-remote.md"] }],
    });
    let file = home.path().join("push.json");
    fs::write(&file, serde_json::to_vec(&notification).expect("json")).expect("write");

    treesync_cmd(home.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("1 imported"))
        .stdout(contains("README.md (readme)"));

    let posts = FsPostStore::open_at(home.path())
        .expect("posts")
        .list()
        .expect("list");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "From Remote");
    assert_eq!(posts[0].permalink.as_deref(), Some("/from-remote/"));

    // Re-exporting rewrites the front matter in place, at the same path.
    treesync_cmd(home.path())
        .arg("export")
        .assert()
        .success();
    let store = FileObjectStore::open_at(home.path()).expect("remote");
    let snapshot = store.head_snapshot().expect("snapshot");
    assert!(snapshot.blob_at("_posts/2024-03-01-from-remote.md").is_some());
}

#[test]
fn import_of_self_authored_commit_is_skipped() {
    let home = TempDir::new().expect("home");
    init_local(&home);
    add_post(&home, "Local", "Body.");
    treesync_cmd(home.path()).arg("export").assert().success();

    let store = FileObjectStore::open_at(home.path()).expect("remote");
    let head = store.inner().head().cloned().expect("head");
    let notification = json!({
        "repository": { "full_name": "me/blog" },
        "ref": "refs/heads/master",
        "head_commit": { "id": head.as_str(), "message": "Full export from treesync at My Blog - treesync" },
        "commits": [],
    });

    assert_cmd::Command::from_std(treesync_cmd(home.path()))
        .args(["import", "-"])
        .write_stdin(serde_json::to_string(&notification).expect("json"))
        .assert()
        .success()
        .stdout(contains("exported by treesync"));
}

#[test]
fn github_backend_without_token_skips_export() {
    let home = TempDir::new().expect("home");
    treesync_cmd(home.path())
        .args(["init", "me/blog"])
        .assert()
        .success();
    add_post(&home, "Offline", "Body.");

    treesync_cmd(home.path())
        .arg("export")
        .assert()
        .success()
        .stdout(contains("export skipped"));

    let status = status_json(&home);
    assert_eq!(status["locked"], json!(true));
    assert_eq!(status["push_lock_held"], json!(false));
}

#[test]
fn lock_left_by_crashed_export_is_reclaimed() {
    let home = TempDir::new().expect("home");
    init_local(&home);
    add_post(&home, "After Crash", "Still here.");
    // Pid above any pid_max: the holder is gone.
    fs::write(home.path().join(".treesync/push.lock"), "2147483647\n").expect("lock");

    let status = status_json(&home);
    assert_eq!(status["push_lock_held"], json!(false));
    assert_eq!(status["locked"], json!(false));

    treesync_cmd(home.path())
        .arg("export")
        .assert()
        .success()
        .stdout(contains("Committed"));
    assert!(!home.path().join(".treesync/push.lock").exists());
}

#[test]
fn post_show_prints_export_path_and_front_matter() {
    let home = TempDir::new().expect("home");
    init_local(&home);
    treesync_cmd(home.path())
        .args([
            "post", "add", "--title", "About", "--type", "page", "--body", "About me.",
        ])
        .assert()
        .success();

    treesync_cmd(home.path())
        .args(["post", "show", "1"])
        .assert()
        .success()
        .stdout(contains("==> _pages/about.md <=="))
        .stdout(contains("post_title: About"))
        .stdout(contains("About me."));
}

#[test]
fn daemon_status_reports_not_running() {
    let home = TempDir::new().expect("home");
    treesync_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("\"running\": false"));
}
