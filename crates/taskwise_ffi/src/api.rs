//! FFI use-case API for the Flutter task board.
//!
//! # Responsibility
//! - Expose the board (Active/Completed tabs) and its actions to Dart via FRB.
//! - Keep error semantics simple: every action returns an envelope with
//!   `ok` and a display message for a transient notification.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - A configuration failure is recorded once and then disables every
//!   store-backed call until restart.
//! - Ids cross the boundary as canonical UUID strings.
//! - A board watch owns its own store connection on a watcher thread and
//!   stops when its handle is released.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use taskwise_core::{
    core_version as core_version_inner, init_logging as init_logging_inner,
    open_configured_store, partition, AppConfig, FeedEvent, NewTask, OpenAiChatBackend,
    PrioritizeOutcome, Prioritizer, SqliteTaskRepository, Task, TaskBoard, TaskEdit, TaskId,
    TaskService, TaskServiceError, TaskSubscription, NO_ACTIVE_TASKS_NOTICE,
};

const MIN_WATCH_INTERVAL_MS: u32 = 50;

static APP_CONFIG: ConfigSlot = ConfigSlot::new();
static WATCHES: Mutex<BTreeMap<u64, Arc<BoardWatch>>> = Mutex::new(BTreeMap::new());
static NEXT_WATCH_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Configuration outcome shared by every store-backed call.
struct ConfigSlot(OnceLock<Result<AppConfig, String>>);

impl ConfigSlot {
    const fn new() -> Self {
        Self(OnceLock::new())
    }

    fn configure(&self, config_path: &str) -> String {
        let loaded = AppConfig::load(config_path.trim()).map_err(|err| err.to_string());
        let message = match &loaded {
            Ok(_) => String::new(),
            Err(err) => err.clone(),
        };
        if self.0.set(loaded).is_err() {
            return "configuration already initialized; restart to reconfigure".to_string();
        }
        if !message.is_empty() {
            error!("event=ffi_configure module=ffi status=error");
        }
        message
    }

    /// Falls back to `TASKWISE_*` variables when `configure` never ran.
    fn resolve(&self) -> Result<&AppConfig, String> {
        self.0
            .get_or_init(|| {
                let mut config = AppConfig::default();
                config.apply_env(|key| std::env::var(key).ok());
                config.validate().map_err(|err| err.to_string())?;
                Ok(config)
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Loads configuration from a TOML file plus `TASKWISE_*` overrides.
///
/// # FFI contract
/// - Must be called before any store-backed call; otherwise configuration
///   comes from the environment alone.
/// - Returns empty string on success and error message on failure.
/// - The first outcome sticks for the life of the process.
#[flutter_rust_bridge::frb(sync)]
pub fn configure(config_path: String) -> String {
    APP_CONFIG.configure(&config_path)
}

/// One task row as rendered by the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
    /// `High|Medium|Low`; always `None` for completed tasks.
    pub priority: Option<String>,
    pub created_at_ms: i64,
}

/// Board envelope for the Active/Completed tabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardResponse {
    pub ok: bool,
    pub active: Vec<TaskItem>,
    pub completed: Vec<TaskItem>,
    /// Whether "Prioritize with AI" is enabled.
    pub can_prioritize: bool,
    pub message: String,
}

/// Generic action envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskActionResponse {
    pub ok: bool,
    /// Affected task, when the action targets one.
    pub task: Option<TaskItem>,
    pub message: String,
}

impl TaskActionResponse {
    fn success(message: impl Into<String>, task: Option<TaskItem>) -> Self {
        Self {
            ok: true,
            task,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            task: None,
            message: message.into(),
        }
    }
}

/// Reads the current board.
#[flutter_rust_bridge::frb(sync)]
pub fn tasks_board() -> BoardResponse {
    match with_task_service(|service, _| service.board()) {
        Ok(board) => board_response(&board),
        Err(err) => board_failure(format!("Failed to fetch tasks: {err}")),
    }
}

/// Handle envelope for a live board watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    pub ok: bool,
    /// Non-zero when `ok`.
    pub handle: u64,
    pub message: String,
}

/// Starts a live board subscription.
///
/// # FFI contract
/// - The first `tasks_watch_next` returns the current board; later ones
///   return a fresh board after every change, including changes committed
///   by other clients of the same store (checked every `interval_ms`).
/// - Call `tasks_watch_stop` when the view goes away.
#[flutter_rust_bridge::frb(sync)]
pub fn tasks_watch_start(interval_ms: u32) -> WatchResponse {
    let interval = Duration::from_millis(u64::from(interval_ms.max(MIN_WATCH_INTERVAL_MS)));
    let started = APP_CONFIG
        .resolve()
        .and_then(|config| BoardWatch::spawn(config.clone(), interval));
    match started {
        Ok(watch) => {
            let handle = NEXT_WATCH_HANDLE.fetch_add(1, Ordering::Relaxed);
            lock_watches().insert(handle, Arc::new(watch));
            info!("event=board_watch module=ffi status=start handle={handle}");
            WatchResponse {
                ok: true,
                handle,
                message: String::new(),
            }
        }
        Err(err) => WatchResponse {
            ok: false,
            handle: 0,
            message: format!("Failed to watch tasks: {err}"),
        },
    }
}

/// Waits up to `timeout_ms` for the next board of a watch.
///
/// # FFI contract
/// - Returns `None` when nothing changed within the timeout.
/// - Returns an `ok = false` board for an unknown or stopped handle and
///   when reading the snapshot failed.
/// - Blocks; call off the UI thread.
pub fn tasks_watch_next(handle: u64, timeout_ms: u32) -> Option<BoardResponse> {
    let Some(watch) = lock_watches().get(&handle).cloned() else {
        return Some(board_failure(format!("unknown watch handle {handle}")));
    };
    let event = watch
        .subscription
        .next_timeout(Duration::from_millis(u64::from(timeout_ms)))?;
    Some(match event {
        FeedEvent::SnapshotReceived(tasks) => board_response(&partition(tasks)),
        FeedEvent::SnapshotFailed(message) => {
            board_failure(format!("Failed to fetch tasks: {message}"))
        }
    })
}

/// Stops a watch. Returns `false` for an unknown handle.
#[flutter_rust_bridge::frb(sync)]
pub fn tasks_watch_stop(handle: u64) -> bool {
    let removed = lock_watches().remove(&handle).is_some();
    if removed {
        info!("event=board_watch module=ffi status=stop handle={handle}");
    }
    removed
}

/// Adds a task from the add dialog.
///
/// On failure the dialog stays open with `message` shown.
#[flutter_rust_bridge::frb(sync)]
pub fn task_add(title: String, description: Option<String>) -> TaskActionResponse {
    let input = NewTask::new(title, description);
    match with_task_service(|service, _| service.add_task(&input)) {
        Ok(task) => TaskActionResponse::success("Task added.", Some(to_task_item(&task))),
        Err(err) => TaskActionResponse::failure(format!("task_add failed: {err}")),
    }
}

/// Saves the edit dialog.
#[flutter_rust_bridge::frb(sync)]
pub fn task_edit(id: String, title: String, description: String) -> TaskActionResponse {
    let edit = TaskEdit { title, description };
    match with_task_id(&id, |service, task_id| service.edit_task(task_id, &edit)) {
        Ok(task) => TaskActionResponse::success("Task updated.", Some(to_task_item(&task))),
        Err(err) => TaskActionResponse::failure(format!("task_edit failed: {err}")),
    }
}

/// Flips the completed checkbox.
#[flutter_rust_bridge::frb(sync)]
pub fn task_toggle(id: String) -> TaskActionResponse {
    match with_task_id(&id, |service, task_id| service.toggle_completed(task_id)) {
        Ok(task) => TaskActionResponse::success("Task updated.", Some(to_task_item(&task))),
        Err(err) => TaskActionResponse::failure(format!("task_toggle failed: {err}")),
    }
}

/// Deletes a task once the user answered the confirmation dialog.
///
/// `confirmed = false` leaves the task untouched.
#[flutter_rust_bridge::frb(sync)]
pub fn task_delete(id: String, confirmed: bool) -> TaskActionResponse {
    let result = with_task_id(&id, |service, task_id| {
        let pending = service.request_delete(task_id)?;
        if !confirmed {
            return Ok(false);
        }
        service.confirm_delete(pending)?;
        Ok(true)
    });
    match result {
        Ok(true) => TaskActionResponse::success("Task deleted.", None),
        Ok(false) => TaskActionResponse::success("Delete cancelled.", None),
        Err(err) => TaskActionResponse::failure(format!("task_delete failed: {err}")),
    }
}

/// Runs one AI prioritization cycle over the active tasks.
///
/// # FFI contract
/// - Blocks for the duration of the model call; call off the UI thread.
/// - With no active tasks, succeeds with an informational message and makes
///   no network call.
pub fn tasks_prioritize() -> TaskActionResponse {
    let result = with_task_service(|service, config| {
        let prioritizer = Prioritizer::new(OpenAiChatBackend::new(&config.llm));
        service.prioritize_active(&prioritizer)
    });
    match result {
        Ok(PrioritizeOutcome::NoActiveTasks) => {
            TaskActionResponse::success(NO_ACTIVE_TASKS_NOTICE, None)
        }
        Ok(PrioritizeOutcome::Applied(_)) => {
            TaskActionResponse::success("Your tasks have been prioritized by AI.", None)
        }
        Err(err) => TaskActionResponse::failure(format!(
            "Could not prioritize tasks. Please try again later. ({err})"
        )),
    }
}

/// Live subscription fed by a watcher thread that polls for other writers.
struct BoardWatch {
    subscription: TaskSubscription,
    // Dropping the sender disconnects the watcher's stop channel.
    _stop: Sender<()>,
}

impl BoardWatch {
    fn spawn(config: AppConfig, interval: Duration) -> Result<Self, String> {
        let (ready_tx, ready_rx) = bounded::<Result<TaskSubscription, String>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        std::thread::Builder::new()
            .name("taskwise-watch".to_string())
            .spawn(move || {
                let conn = match open_configured_store(&config) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.to_string()));
                        return;
                    }
                };
                let repo = match SqliteTaskRepository::try_new(&conn) {
                    Ok(repo) => repo,
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!("task repo init failed: {err}")));
                        return;
                    }
                };
                let service = TaskService::new(repo);
                if ready_tx.send(Ok(service.subscribe())).is_err() {
                    return;
                }

                while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(interval) {
                    if let Err(err) = service.poll_external_changes() {
                        warn!("event=board_watch module=ffi status=error error_code=poll_failed");
                        service
                            .feed()
                            .publish(FeedEvent::SnapshotFailed(err.to_string()));
                    }
                }
            })
            .map_err(|err| format!("failed to start watcher thread: {err}"))?;

        let subscription = ready_rx
            .recv()
            .map_err(|_| "watcher thread exited before subscribing".to_string())??;
        Ok(Self {
            subscription,
            _stop: stop_tx,
        })
    }
}

fn lock_watches() -> MutexGuard<'static, BTreeMap<u64, Arc<BoardWatch>>> {
    WATCHES
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn with_task_service<T>(
    f: impl FnOnce(&TaskService<SqliteTaskRepository<'_>>, &AppConfig) -> Result<T, TaskServiceError>,
) -> Result<T, String> {
    with_task_service_in(&APP_CONFIG, f)
}

fn with_task_service_in<T>(
    slot: &ConfigSlot,
    f: impl FnOnce(&TaskService<SqliteTaskRepository<'_>>, &AppConfig) -> Result<T, TaskServiceError>,
) -> Result<T, String> {
    let config = slot.resolve()?;
    let conn = open_configured_store(config).map_err(|err| err.to_string())?;
    let repo = SqliteTaskRepository::try_new(&conn)
        .map_err(|err| format!("task repo init failed: {err}"))?;
    let service = TaskService::new(repo);
    f(&service, config).map_err(|err| err.to_string())
}

fn with_task_id<T>(
    id: &str,
    f: impl FnOnce(&TaskService<SqliteTaskRepository<'_>>, TaskId) -> Result<T, TaskServiceError>,
) -> Result<T, String> {
    let task_id =
        TaskId::parse_str(id.trim()).map_err(|_| format!("invalid task id `{}`", id.trim()))?;
    with_task_service(|service, _| f(service, task_id))
}

fn board_response(board: &TaskBoard) -> BoardResponse {
    BoardResponse {
        ok: true,
        can_prioritize: board.can_prioritize(),
        active: board.active.iter().map(to_task_item).collect(),
        completed: board.completed.iter().map(to_task_item).collect(),
        message: String::new(),
    }
}

fn board_failure(message: String) -> BoardResponse {
    BoardResponse {
        ok: false,
        active: Vec::new(),
        completed: Vec::new(),
        can_prioritize: false,
        message,
    }
}

fn to_task_item(task: &Task) -> TaskItem {
    TaskItem {
        id: task.id.to_string(),
        title: task.title.clone(),
        description: task.description.clone(),
        completed: task.completed,
        priority: task.visible_priority().map(|priority| priority.to_string()),
        created_at_ms: task.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        configure, core_version, init_logging, task_add, task_delete, task_edit, task_toggle,
        tasks_board, tasks_prioritize, tasks_watch_next, tasks_watch_start, tasks_watch_stop,
        with_task_service_in, ConfigSlot,
    };
    use std::sync::OnceLock;
    use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

    fn ensure_test_config() {
        static INIT: OnceLock<()> = OnceLock::new();
        INIT.get_or_init(|| {
            let dir = std::env::temp_dir().join(format!("taskwise-ffi-{}", unique_token("cfg")));
            std::fs::create_dir_all(&dir).expect("create test dir");
            let db_path = dir.join("tasks.db");
            let config_path = dir.join("taskwise.toml");
            std::fs::write(
                &config_path,
                format!(
                    "[store]\ndb_path = {:?}\n\n[llm]\nbase_url = \"http://127.0.0.1:9\"\ntimeout_secs = 2\n",
                    db_path.to_string_lossy()
                ),
            )
            .expect("write test config");
            let message = configure(config_path.to_string_lossy().into_owned());
            assert!(message.is_empty(), "{message}");
        });
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "/tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn add_then_toggle_moves_task_between_tabs() {
        ensure_test_config();
        let title = unique_token("toggle");
        let added = task_add(title.clone(), None);
        assert!(added.ok, "{}", added.message);
        let item = added.task.expect("added task should be returned");
        assert!(!item.completed);
        assert_eq!(item.priority, None);

        let board = tasks_board();
        assert!(board.ok, "{}", board.message);
        assert!(board.active.iter().any(|task| task.id == item.id));
        assert!(board.can_prioritize);

        let toggled = task_toggle(item.id.clone());
        assert!(toggled.ok, "{}", toggled.message);

        let board = tasks_board();
        assert!(board.completed.iter().any(|task| task.id == item.id));
        assert!(!board.active.iter().any(|task| task.id == item.id));
    }

    #[test]
    fn blank_title_is_rejected() {
        ensure_test_config();
        let response = task_add("   ".to_string(), Some("details".to_string()));
        assert!(!response.ok);
        assert!(response.message.contains("title"));
    }

    #[test]
    fn edit_updates_title() {
        ensure_test_config();
        let added = task_add(unique_token("edit"), None);
        let item = added.task.expect("added task should be returned");

        let edited = task_edit(item.id.clone(), "renamed".to_string(), "notes".to_string());
        assert!(edited.ok, "{}", edited.message);
        let edited = edited.task.expect("edited task should be returned");
        assert_eq!(edited.title, "renamed");
        assert_eq!(edited.description, "notes");
    }

    #[test]
    fn delete_requires_confirmation() {
        ensure_test_config();
        let added = task_add(unique_token("delete"), None);
        let item = added.task.expect("added task should be returned");

        let cancelled = task_delete(item.id.clone(), false);
        assert!(cancelled.ok);
        assert!(tasks_board().active.iter().any(|task| task.id == item.id));

        let deleted = task_delete(item.id.clone(), true);
        assert!(deleted.ok, "{}", deleted.message);
        let board = tasks_board();
        assert!(!board.active.iter().any(|task| task.id == item.id));
        assert!(!board.completed.iter().any(|task| task.id == item.id));
    }

    #[test]
    fn invalid_id_is_reported() {
        ensure_test_config();
        let response = task_toggle("not-an-id".to_string());
        assert!(!response.ok);
        assert!(response.message.contains("invalid task id"));
    }

    #[test]
    fn unreachable_model_reports_failure_and_keeps_priorities() {
        ensure_test_config();
        let added = task_add(unique_token("prioritize"), None);
        let item = added.task.expect("added task should be returned");

        let response = tasks_prioritize();
        assert!(!response.ok);
        assert!(response.message.contains("Could not prioritize tasks"));

        let board = tasks_board();
        let still = board
            .active
            .iter()
            .find(|task| task.id == item.id)
            .expect("task should still be active");
        assert_eq!(still.priority, None);
    }

    #[test]
    fn watch_pushes_board_changes_made_through_other_calls() {
        ensure_test_config();
        let started = tasks_watch_start(50);
        assert!(started.ok, "{}", started.message);
        assert_ne!(started.handle, 0);

        let initial = tasks_watch_next(started.handle, 2_000).expect("initial board");
        assert!(initial.ok, "{}", initial.message);

        let added = task_add(unique_token("watched"), None);
        let id = added.task.expect("added task should be returned").id;

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut delivered = false;
        while !delivered && Instant::now() < deadline {
            if let Some(board) = tasks_watch_next(started.handle, 200) {
                delivered = board.ok && board.active.iter().any(|task| task.id == id);
            }
        }
        assert!(delivered, "new task never reached the watch");

        assert!(tasks_watch_stop(started.handle));
        assert!(!tasks_watch_stop(started.handle));
        let stopped = tasks_watch_next(started.handle, 10).expect("stopped handle reports");
        assert!(!stopped.ok);
    }

    #[test]
    fn failed_configuration_disables_store_calls() {
        let dir = std::env::temp_dir().join(format!("taskwise-ffi-{}", unique_token("badcfg")));
        std::fs::create_dir_all(&dir).expect("create test dir");
        let broken = dir.join("broken.toml");
        std::fs::write(&broken, "[store\ndb_path = ").expect("write broken config");
        let valid = dir.join("valid.toml");
        std::fs::write(&valid, "[store]\ndb_path = \"/tmp/unused.db\"\n").expect("write config");

        let slot = ConfigSlot::new();
        let message = slot.configure(&broken.to_string_lossy());
        assert!(message.contains("invalid config file"), "{message}");

        let err = with_task_service_in(&slot, |service, _| service.board()).unwrap_err();
        assert_eq!(err, message);

        let again = slot.configure(&valid.to_string_lossy());
        assert!(again.contains("already initialized"));
        assert!(with_task_service_in(&slot, |service, _| service.list_tasks()).is_err());
    }

    fn unique_token(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }
}
