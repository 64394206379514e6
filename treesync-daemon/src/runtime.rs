use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use treesync_core::posts::post_id_from_file_name;
use treesync_core::{layout, ChangeNotification, FsPostStore, Post, PostId, PostStore};
use treesync_sync::pipeline::{self, ExportScope};
use treesync_sync::{lock, state, ExportOutcome, ImportOutcome};

use crate::error::{io_err, DaemonError};
use crate::paths::{posts_dir, socket_path, DEBOUNCE_WINDOW, LOG_FORMAT_ENV};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Last known state of every local post, so a deleted post file can still be
/// removed from the remote.
pub type PostCache = HashMap<PostId, Post>;

#[derive(Debug, Clone)]
enum SyncTarget {
    ExportAll,
    ExportPost(PostId),
    Removed(Box<Post>),
    Import(Box<ChangeNotification>),
}

impl SyncTarget {
    fn label(&self) -> String {
        match self {
            SyncTarget::ExportAll => "export all".to_string(),
            SyncTarget::ExportPost(id) => format!("export post {id}"),
            SyncTarget::Removed(post) => format!("remove post {}", post.id),
            SyncTarget::Import(n) => match &n.head_commit {
                Some(head) => format!("import {}", head.id),
                None => "import".to_string(),
            },
        }
    }
}

struct SyncJob {
    target: SyncTarget,
    source: &'static str,
    respond_to: oneshot::Sender<Result<SyncSummary, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub target: String,
    pub source: String,
    /// `no_change`, `committed`, `errored`, `locked`, `imported`, ...
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u128,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    layout::ensure_root(&home)?;

    let cache = Arc::new(RwLock::new(load_post_cache(&home)?));
    let last_sync: Arc<RwLock<Option<u64>>> = Arc::new(RwLock::new(None));
    let started_at_unix = unix_seconds_now();

    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let cache = cache.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(home, cache, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let cache = cache.clone();
        let last_sync = last_sync.clone();
        tokio::spawn(async move {
            let result =
                sync_processor_task(home, cache, last_sync, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let cache = cache.clone();
        let sync_tx = sync_tx.clone();
        let last_sync = last_sync.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                cache,
                last_sync,
                sync_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, processor_result, socket_result, signal_result) =
        tokio::join!(watcher_handle, processor_handle, socket_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("sync_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn watcher_task(
    home: PathBuf,
    cache: Arc<RwLock<PostCache>>,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let posts = posts_dir(&home);
    if !posts.exists() {
        fs::create_dir_all(&posts).map_err(|e| io_err(&posts, e))?;
    }
    // Events arrive with real paths (e.g. /private/var/... on macOS).
    let posts = fs::canonicalize(&posts).unwrap_or(posts);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&posts, RecursiveMode::NonRecursive)?;
    tracing::info!(path = %posts.display(), "watching post directory");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                let Some(kind) = classify_event(&event.kind) else {
                    continue;
                };

                for path in event.paths {
                    let Some(id) = post_id_for_path(&path, &posts) else {
                        continue;
                    };
                    let target = match kind {
                        PostEvent::Saved if path.exists() => SyncTarget::ExportPost(id),
                        // Renamed away or removed.
                        PostEvent::Saved | PostEvent::Removed => {
                            match cache.read().await.get(&id).cloned() {
                                Some(post) => SyncTarget::Removed(Box::new(post)),
                                None => {
                                    tracing::debug!(post = %id, "removed post was never cached");
                                    continue;
                                }
                            }
                        }
                    };
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }

                    match enqueue_sync(&sync_tx, target, "watcher").await {
                        Ok(summary) => tracing::info!(
                            target = %summary.target,
                            outcome = %summary.outcome,
                            duration_ms = summary.duration_ms,
                            "watcher-triggered sync completed",
                        ),
                        Err(err) => tracing::error!(error = %err, "watcher-triggered sync failed"),
                    }
                }
            }
        }
    }

    Ok(())
}

async fn sync_processor_task(
    home: PathBuf,
    cache: Arc<RwLock<PostCache>>,
    last_sync: Arc<RwLock<Option<u64>>>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();

                let label = job.target.label();
                let target = job.target;
                let home_for_sync = home.clone();
                let result = tokio::task::spawn_blocking(move || run_target(&home_for_sync, target))
                    .await
                    .map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))?;

                let outcome = match result {
                    Ok((outcome, detail)) => {
                        if let Err(err) = refresh_cache(home.clone(), cache.clone()).await {
                            tracing::warn!(error = %err, "post cache refresh failed");
                        }
                        *last_sync.write().await = Some(unix_seconds_now());
                        Ok(SyncSummary {
                            target: label,
                            source: job.source.to_string(),
                            outcome,
                            detail,
                            duration_ms: started.elapsed().as_millis(),
                        })
                    }
                    Err(err) => Err(err.to_string()),
                };

                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

/// Run one sync target; returns the outcome name and an optional detail.
fn run_target(home: &Path, target: SyncTarget) -> Result<(String, Option<String>), DaemonError> {
    match target {
        SyncTarget::ExportAll => Ok(describe_export(&pipeline::run_export(home, ExportScope::All)?)),
        SyncTarget::ExportPost(id) => Ok(describe_export(&pipeline::run_export(
            home,
            ExportScope::Post(id),
        )?)),
        SyncTarget::Removed(post) => Ok(describe_export(&pipeline::run_export(
            home,
            ExportScope::Removed(post),
        )?)),
        SyncTarget::Import(notification) => {
            Ok(describe_import(&pipeline::run_import(home, &notification)?))
        }
    }
}

pub fn describe_export(outcome: &ExportOutcome) -> (String, Option<String>) {
    match outcome {
        ExportOutcome::NoChange => ("no_change".into(), None),
        ExportOutcome::Committed { commit, .. } => ("committed".into(), Some(commit.hash.to_string())),
        ExportOutcome::Errored { message, .. } => ("errored".into(), Some(message.clone())),
        ExportOutcome::Locked => ("locked".into(), None),
    }
}

pub fn describe_import(outcome: &ImportOutcome) -> (String, Option<String>) {
    match outcome {
        ImportOutcome::SelfAuthored => ("self_authored".into(), None),
        ImportOutcome::Rejected { reason } => ("rejected".into(), Some(reason.clone())),
        ImportOutcome::Imported(report) => (
            "imported".into(),
            Some(format!(
                "{} imported, {} deleted, {} skipped",
                report.imported.len(),
                report.deleted.len(),
                report.skipped.len()
            )),
        ),
        ImportOutcome::Errored { message } => ("errored".into(), Some(message.clone())),
    }
}

async fn socket_server_task(
    home: PathBuf,
    cache: Arc<RwLock<PostCache>>,
    last_sync: Arc<RwLock<Option<u64>>>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let cache = cache.clone();
                let last_sync = last_sync.clone();
                let sync_tx = sync_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        cache,
                        last_sync,
                        sync_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    cache: Arc<RwLock<PostCache>>,
    last_sync: Arc<RwLock<Option<u64>>>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        let response = match cmd.as_str() {
            "status" => {
                let payload =
                    build_status_payload(&home, cache.clone(), last_sync.clone(), started_at_unix)
                        .await;
                DaemonResponse::ok(payload)
            }
            "export" => {
                let target = match request.post {
                    Some(id) => SyncTarget::ExportPost(id),
                    None => SyncTarget::ExportAll,
                };
                match enqueue_sync(&sync_tx, target, "socket").await {
                    Ok(summary) => DaemonResponse::ok(json!(summary)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "import" => match request.notification {
                Some(n) => match enqueue_sync(&sync_tx, SyncTarget::Import(Box::new(n)), "socket").await {
                    Ok(summary) => DaemonResponse::ok(json!(summary)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                },
                None => DaemonResponse::error("import requires a notification"),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    home: &Path,
    cache: Arc<RwLock<PostCache>>,
    last_sync: Arc<RwLock<Option<u64>>>,
    started_at_unix: u64,
) -> Value {
    let posts = cache.read().await.len();
    let last_sync_at_unix = last_sync.read().await.unwrap_or(0);
    let sync_state = match state::load_at(home) {
        Ok(s) => json!(s),
        Err(err) => json!({ "error": err.to_string() }),
    };

    json!({
        "running": true,
        "started_at_unix": started_at_unix,
        "last_sync_at_unix": last_sync_at_unix,
        "posts": posts,
        "push_locked": lock::is_held_at(home),
        "push_lock_holder": lock::holder_pid_at(home),
        "state": sync_state,
        "socket": socket_path(home).display().to_string(),
        "posts_dir": posts_dir(home).display().to_string(),
    })
}

async fn enqueue_sync(
    sync_tx: &mpsc::Sender<SyncJob>,
    target: SyncTarget,
    source: &'static str,
) -> Result<SyncSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    sync_tx
        .send(SyncJob {
            target,
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
    outcome.map_err(DaemonError::Protocol)
}

async fn refresh_cache(home: PathBuf, cache: Arc<RwLock<PostCache>>) -> Result<(), DaemonError> {
    let refreshed = tokio::task::spawn_blocking(move || load_post_cache(&home))
        .await
        .map_err(|err| DaemonError::Protocol(format!("cache refresh join error: {err}")))??;
    *cache.write().await = refreshed;
    Ok(())
}

fn load_post_cache(home: &Path) -> Result<PostCache, DaemonError> {
    let store = FsPostStore::open_at(home)?;
    Ok(store.list()?.into_iter().map(|p| (p.id, p)).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostEvent {
    Saved,
    Removed,
}

fn classify_event(kind: &EventKind) -> Option<PostEvent> {
    match kind {
        EventKind::Create(_) | EventKind::Modify(_) => Some(PostEvent::Saved),
        EventKind::Remove(_) => Some(PostEvent::Removed),
        _ => None,
    }
}

/// Post id of a `<id>.yaml` file directly inside `posts`.
fn post_id_for_path(path: &Path, posts: &Path) -> Option<PostId> {
    if path.parent() != Some(posts) {
        return None;
    }
    post_id_from_file_name(path.file_name()?.to_str()?)
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use tokio::time::advance;
    use treesync_core::{config, Backend, SiteConfig};

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn debounce_coalesces_rapid_events() {
        let threshold = Duration::from_millis(100);
        let mut debounce = HashMap::<PathBuf, Instant>::new();
        let path = PathBuf::from("/tmp/posts/3.yaml");
        let mut triggers = 0usize;

        for _ in 0..5 {
            if should_process_event_with_threshold(&mut debounce, &path, Instant::now(), threshold)
            {
                triggers += 1;
            }
            advance(Duration::from_millis(10)).await;
        }
        advance(Duration::from_millis(150)).await;
        assert!(should_process_event_with_threshold(
            &mut debounce,
            &path,
            Instant::now(),
            threshold
        ));
        assert_eq!(triggers, 1, "rapid saves should collapse to one export");
    }

    #[test]
    fn only_post_files_map_to_ids() {
        let posts = PathBuf::from("/home/u/.treesync/posts");
        assert_eq!(post_id_for_path(&posts.join("12.yaml"), &posts), Some(PostId(12)));
        assert_eq!(post_id_for_path(&posts.join("12.yaml.tmp"), &posts), None);
        assert_eq!(post_id_for_path(&posts.join("notes.txt"), &posts), None);
        assert_eq!(
            post_id_for_path(Path::new("/elsewhere/12.yaml"), &posts),
            None
        );
    }

    #[test]
    fn event_kinds() {
        use notify::event::{CreateKind, RemoveKind};
        assert_eq!(classify_event(&EventKind::Create(CreateKind::File)), Some(PostEvent::Saved));
        assert_eq!(classify_event(&EventKind::Remove(RemoveKind::File)), Some(PostEvent::Removed));
        assert_eq!(classify_event(&EventKind::Any), None);
    }

    #[test]
    fn post_cache_loads_every_post() {
        let home = TempDir::new().expect("home");
        let mut store = FsPostStore::open_at(home.path()).expect("store");
        for id in [1, 2] {
            store.save(&Post::new(PostId(id), format!("p{id}"), "")).expect("save");
        }
        let cache = load_post_cache(home.path()).expect("cache");
        assert_eq!(cache.len(), 2);
        assert!(cache.contains_key(&PostId(2)));
    }

    #[tokio::test]
    async fn status_payload_reports_state_and_lock() {
        let home = TempDir::new().expect("home");
        let cache = Arc::new(RwLock::new(PostCache::new()));
        let last_sync = Arc::new(RwLock::new(None));

        let payload = build_status_payload(home.path(), cache, last_sync, 1_000_000).await;
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["last_sync_at_unix"], json!(0u64));
        assert_eq!(payload["push_locked"], json!(false));
        assert_eq!(payload["state"]["export_complete"], json!(false));
    }

    #[test]
    fn run_target_exports_through_local_backend() {
        let home = TempDir::new().expect("home");
        config::init_at(home.path(), SiteConfig::new("me/blog", Backend::Local)).expect("init");
        let mut store = FsPostStore::open_at(home.path()).expect("store");
        store.save(&Post::new(PostId(1), "Hello", "body")).expect("save");

        let (outcome, detail) = run_target(home.path(), SyncTarget::ExportPost(PostId(1))).expect("run");
        assert_eq!(outcome, "committed");
        assert!(detail.is_some());

        let (outcome, _) = run_target(home.path(), SyncTarget::ExportAll).expect("run");
        assert_eq!(outcome, "no_change");

        let post = store.get(PostId(1)).expect("get").expect("post");
        store.delete(PostId(1)).expect("delete");
        let (outcome, _) = run_target(home.path(), SyncTarget::Removed(Box::new(post))).expect("run");
        assert_eq!(outcome, "committed");
    }
}
