//! Task use-case service.
//!
//! # Responsibility
//! - Provide add/edit/toggle/delete/list entry points for UI callers.
//! - Run the prioritization cycle: snapshot, model call, reconcile, commit.
//! - Push a fresh snapshot to subscribers after every successful write.
//!
//! # Invariants
//! - Validation runs before any store call.
//! - Deletion needs a `PendingDelete`, which only `request_delete` creates.
//! - A failed prioritization cycle leaves every priority unchanged.
//! - `TaskService` reaches storage only through `TaskRepository`;
//!   `open_configured_store` is the one place that names SQLite.

use crate::ai::{CompletionBackend, GenerationError, PrioritizeInput, Prioritizer};
use crate::config::{AppConfig, ConfigError};
use crate::db::open_db;
use crate::feed::{FeedEvent, TaskFeed, TaskSubscription};
use crate::model::task::{partition, NewTask, Task, TaskBoard, TaskEdit, TaskId, TaskValidationError};
use crate::repo::task_repo::{CommitReport, RepoError, TaskRepository};
use crate::service::reconcile::reconcile;
use log::{error, info, warn};
use rusqlite::Connection;
use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// User-facing notice when there is nothing to prioritize.
pub const NO_ACTIVE_TASKS_NOTICE: &str = "There are no active tasks to prioritize.";

/// Service error surfaced to the triggering user action.
#[derive(Debug)]
pub enum TaskServiceError {
    /// Store is not configured or cannot be opened.
    Configuration(String),
    /// Local input rejected before any store call.
    Validation(TaskValidationError),
    NotFound(TaskId),
    /// Create/update/delete failed in storage.
    Store(RepoError),
    /// Reading the task list failed.
    Fetch(RepoError),
    /// Model call failed or its reply was rejected.
    Generation(GenerationError),
    /// Priority batch failed and was rolled back.
    Commit(RepoError),
}

impl Display for TaskServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(message) => write!(f, "configuration error: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::Store(err) => write!(f, "task store error: {err}"),
            Self::Fetch(err) => write!(f, "failed to fetch tasks: {err}"),
            Self::Generation(err) => write!(f, "AI prioritization failed: {err}"),
            Self::Commit(err) => write!(f, "failed to save priorities: {err}"),
        }
    }
}

impl Error for TaskServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) | Self::Fetch(err) | Self::Commit(err) => Some(err),
            Self::Generation(err) => Some(err),
            Self::Configuration(_) | Self::NotFound(_) => None,
        }
    }
}

impl From<RepoError> for TaskServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Store(other),
        }
    }
}

impl From<TaskValidationError> for TaskServiceError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<GenerationError> for TaskServiceError {
    fn from(value: GenerationError) -> Self {
        Self::Generation(value)
    }
}

impl From<ConfigError> for TaskServiceError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

/// Opens the configured task store.
///
/// # Errors
/// - `Configuration` when no store path is set or the store cannot be
///   opened; callers treat every store operation as unavailable.
pub fn open_configured_store(config: &AppConfig) -> Result<Connection, TaskServiceError> {
    let path = config.db_path()?;
    open_db(path).map_err(|err| {
        TaskServiceError::Configuration(format!(
            "cannot open task store `{}`: {err}",
            path.display()
        ))
    })
}

/// Confirmation token for a delete, produced by `request_delete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    id: TaskId,
    title: String,
}

impl PendingDelete {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Title to show in the confirmation prompt.
    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Result of a prioritization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrioritizeOutcome {
    /// Nothing active; no model call was made.
    NoActiveTasks,
    Applied(CommitReport),
}

/// Use-case service over a task repository.
pub struct TaskService<R: TaskRepository> {
    repo: R,
    feed: TaskFeed,
    seen_data_version: Cell<Option<i64>>,
}

impl<R: TaskRepository> TaskService<R> {
    /// Creates a service with its own change feed.
    pub fn new(repo: R) -> Self {
        Self::with_feed(repo, TaskFeed::new())
    }

    /// Creates a service publishing to a shared feed.
    pub fn with_feed(repo: R, feed: TaskFeed) -> Self {
        let seen = repo.data_version().ok();
        Self {
            repo,
            feed,
            seen_data_version: Cell::new(seen),
        }
    }

    pub fn feed(&self) -> &TaskFeed {
        &self.feed
    }

    /// Creates a task with `completed = false` and no priority.
    pub fn add_task(&self, input: &NewTask) -> Result<Task, TaskServiceError> {
        let (title, description) = input.normalized()?;
        let task = self.repo.create_task(&title, &description)?;
        info!("event=task_add module=service status=ok task_id={}", task.id);
        self.publish_snapshot();
        Ok(task)
    }

    /// Replaces title and description of one task.
    pub fn edit_task(&self, id: TaskId, edit: &TaskEdit) -> Result<Task, TaskServiceError> {
        let (title, description) = edit.normalized()?;
        self.repo.update_content(id, &title, &description)?;
        info!("event=task_edit module=service status=ok task_id={id}");
        self.publish_snapshot();
        self.read_back(id)
    }

    /// Flips the `completed` flag. Priority is left as is.
    pub fn toggle_completed(&self, id: TaskId) -> Result<Task, TaskServiceError> {
        let current = self.repo.get_task(id)?.ok_or(TaskServiceError::NotFound(id))?;
        self.repo.set_completed(id, !current.completed)?;
        info!(
            "event=task_toggle module=service status=ok task_id={id} completed={}",
            !current.completed
        );
        self.publish_snapshot();
        self.read_back(id)
    }

    /// First step of deletion; nothing is removed yet.
    pub fn request_delete(&self, id: TaskId) -> Result<PendingDelete, TaskServiceError> {
        let task = self.repo.get_task(id)?.ok_or(TaskServiceError::NotFound(id))?;
        Ok(PendingDelete {
            id: task.id,
            title: task.title,
        })
    }

    /// Second step of deletion: removes the confirmed task.
    pub fn confirm_delete(&self, pending: PendingDelete) -> Result<(), TaskServiceError> {
        self.repo.delete_task(pending.id)?;
        info!(
            "event=task_delete module=service status=ok task_id={}",
            pending.id
        );
        self.publish_snapshot();
        Ok(())
    }

    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>, TaskServiceError> {
        self.repo.get_task(id).map_err(TaskServiceError::Fetch)
    }

    /// Lists every task, newest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>, TaskServiceError> {
        self.repo.list_tasks().map_err(TaskServiceError::Fetch)
    }

    /// Active/completed partition of the current task list.
    pub fn board(&self) -> Result<TaskBoard, TaskServiceError> {
        Ok(partition(self.list_tasks()?))
    }

    /// Subscribes to the change feed; the current snapshot arrives first.
    pub fn subscribe(&self) -> TaskSubscription {
        let subscription = self.feed.subscribe();
        self.publish_snapshot();
        subscription
    }

    /// Republishes when another client committed since the last check.
    ///
    /// Returns whether a snapshot was published.
    pub fn poll_external_changes(&self) -> Result<bool, TaskServiceError> {
        let version = self.repo.data_version().map_err(TaskServiceError::Fetch)?;
        if self.seen_data_version.replace(Some(version)) == Some(version) {
            return Ok(false);
        }
        self.publish_snapshot();
        Ok(true)
    }

    /// Runs a prioritization cycle over the currently active tasks.
    pub fn prioritize_active<B: CompletionBackend>(
        &self,
        prioritizer: &Prioritizer<B>,
    ) -> Result<PrioritizeOutcome, TaskServiceError> {
        let active = self.board()?.active;
        self.prioritize_snapshot(&active, prioritizer)
    }

    /// Runs a prioritization cycle over a snapshot the caller already holds.
    ///
    /// Only tasks that still exist and are still active at commit time get
    /// a priority; the rest are reported as skipped.
    pub fn prioritize_snapshot<B: CompletionBackend>(
        &self,
        snapshot: &[Task],
        prioritizer: &Prioritizer<B>,
    ) -> Result<PrioritizeOutcome, TaskServiceError> {
        let active: Vec<Task> = snapshot.iter().filter(|task| task.is_active()).cloned().collect();
        if active.is_empty() {
            info!("event=prioritize module=service status=skipped reason=no_active_tasks");
            return Ok(PrioritizeOutcome::NoActiveTasks);
        }

        let inputs: Vec<PrioritizeInput> = active.iter().map(PrioritizeInput::from).collect();
        let rows = prioritizer.prioritize(&inputs)?;
        let updates = reconcile(&active, &rows);

        let report = match self.repo.apply_priority_batch(&updates) {
            Ok(report) => report,
            Err(err) => {
                error!(
                    "event=prioritize module=service status=error error_code=commit_failed error={err}"
                );
                return Err(TaskServiceError::Commit(err));
            }
        };
        if !report.skipped.is_empty() {
            warn!(
                "event=prioritize module=service status=partial skipped_stale={}",
                report.skipped.len()
            );
        }
        info!(
            "event=prioritize module=service status=ok applied={}",
            report.applied.len()
        );

        self.publish_snapshot();
        Ok(PrioritizeOutcome::Applied(report))
    }

    fn read_back(&self, id: TaskId) -> Result<Task, TaskServiceError> {
        self.repo
            .get_task(id)
            .map_err(TaskServiceError::Fetch)?
            .ok_or(TaskServiceError::NotFound(id))
    }

    fn publish_snapshot(&self) {
        let event = match self.repo.list_tasks() {
            Ok(tasks) => FeedEvent::SnapshotReceived(tasks),
            Err(err) => {
                error!("event=feed_snapshot module=service status=error error={err}");
                FeedEvent::SnapshotFailed(format!("failed to fetch tasks: {err}"))
            }
        };
        self.feed.publish(event);
    }
}
