use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use treesync_remote::{FileObjectStore, ObjectStore};

fn treesync_bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_treesync"))
}

fn treesync(binary: &Path, home: &Path) -> Command {
    let mut cmd = Command::new(binary);
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("TREESYNC_TOKEN");
    cmd
}

struct DaemonProcess {
    child: Child,
    binary: PathBuf,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(binary: PathBuf, home: PathBuf) -> Self {
        let child = treesync(&binary, &home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");

        Self {
            child,
            binary,
            home,
        }
    }

    fn stop(&mut self) {
        let _ = treesync(&self.binary, &self.home)
            .args(["daemon", "stop"])
            .status();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn daemon_running(binary: &Path, home: &Path) -> bool {
    let Ok(output) = treesync(binary, home).args(["daemon", "status"]).output() else {
        return false;
    };
    if !output.status.success() {
        return false;
    }
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&output.stdout) else {
        return false;
    };
    value
        .get("running")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn remote_paths(home: &Path) -> Vec<String> {
    let Ok(store) = FileObjectStore::open_at(home) else {
        return Vec::new();
    };
    store
        .head_snapshot()
        .map(|s| s.blobs().map(|e| e.path.clone()).collect())
        .unwrap_or_default()
}

#[test]
fn saved_and_removed_posts_are_synced_by_daemon() {
    let home = TempDir::new().expect("home");
    let binary = treesync_bin_path();

    let init = treesync(&binary, home.path())
        .args(["init", "me/blog", "--backend", "local"])
        .output()
        .expect("run init");
    assert!(init.status.success(), "init failed: {}", String::from_utf8_lossy(&init.stderr));

    let mut daemon = DaemonProcess::start(binary.clone(), home.path().to_path_buf());
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(&binary, home.path())),
        "daemon did not report running state in time",
    );

    let add = treesync(&binary, home.path())
        .args(["post", "add", "--title", "Autosynced", "--body", "Saved while watching."])
        .output()
        .expect("run post add");
    assert!(add.status.success(), "post add failed: {}", String::from_utf8_lossy(&add.stderr));

    let exported = wait_until(Duration::from_secs(10), || {
        remote_paths(home.path())
            .iter()
            .any(|p| p.ends_with("-autosynced.md"))
    });
    assert!(exported, "daemon did not export the new post within timeout");

    // Let the write-back settle into the daemon's post cache.
    sleep(Duration::from_millis(800));

    let remove = treesync(&binary, home.path())
        .args(["post", "remove", "1"])
        .output()
        .expect("run post remove");
    assert!(remove.status.success());

    let removed = wait_until(Duration::from_secs(10), || {
        !remote_paths(home.path())
            .iter()
            .any(|p| p.ends_with("-autosynced.md"))
    });
    assert!(removed, "daemon did not remove the deleted post from the remote");

    daemon.stop();
}
