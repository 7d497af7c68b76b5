//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide create/update/delete/list APIs over the `tasks` collection.
//! - Apply prioritization results as one all-or-nothing batch.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths validate titles before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Listing order is always `created_at DESC`, newest insert first on ties.
//! - The priority batch writes only the `priority` column.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::task::{Priority, Task, TaskId, TaskValidationError};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    title,
    description,
    completed,
    priority,
    created_at
FROM tasks";

const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "title",
    "description",
    "completed",
    "priority",
    "created_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for task persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(TaskValidationError),
    Db(DbError),
    NotFound(TaskId),
    InvalidData(String),
    /// Connection was not bootstrapped through `open_db*`.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted task data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One queued field update produced by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityUpdate {
    pub id: TaskId,
    pub priority: Priority,
}

/// Outcome of an applied priority batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommitReport {
    /// Tasks whose priority was written.
    pub applied: Vec<TaskId>,
    /// Tasks deleted or completed after the snapshot was taken.
    pub skipped: Vec<TaskId>,
}

/// Repository interface for the task collection.
pub trait TaskRepository {
    /// Inserts a task with store-assigned id and creation time.
    fn create_task(&self, title: &str, description: &str) -> RepoResult<Task>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Lists every task, newest first.
    fn list_tasks(&self) -> RepoResult<Vec<Task>>;
    fn update_content(&self, id: TaskId, title: &str, description: &str) -> RepoResult<()>;
    fn set_completed(&self, id: TaskId, completed: bool) -> RepoResult<()>;
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
    /// Applies every update in one transaction.
    ///
    /// Each update only lands if the task still exists and is still active;
    /// others are reported as skipped. Any storage failure rolls back the
    /// whole batch.
    fn apply_priority_batch(&self, updates: &[PriorityUpdate]) -> RepoResult<CommitReport>;
    /// Monotonic marker that changes when another connection commits.
    fn data_version(&self) -> RepoResult<i64>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Wraps a connection after checking it was fully migrated.
    ///
    /// # Errors
    /// - `UninitializedConnection` when `user_version` is not the latest.
    /// - `MissingRequiredTable`/`MissingRequiredColumn` when the schema is
    ///   incomplete.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let actual_version = current_user_version(conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }

        let columns = table_columns(conn, "tasks")?;
        if columns.is_empty() {
            return Err(RepoError::MissingRequiredTable("tasks"));
        }
        for column in REQUIRED_COLUMNS {
            if !columns.iter().any(|existing| existing == column) {
                return Err(RepoError::MissingRequiredColumn {
                    table: "tasks",
                    column,
                });
            }
        }

        Ok(Self { conn })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, title: &str, description: &str) -> RepoResult<Task> {
        if title.trim().is_empty() {
            return Err(TaskValidationError::EmptyTitle.into());
        }

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO tasks (id, title, description, completed, priority)
             VALUES (?1, ?2, ?3, 0, NULL);",
            params![id.to_string(), title, description],
        )?;

        self.get_task(id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("created task {id} not found in read-back"))
        })
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL} ORDER BY created_at DESC, rowid DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn update_content(&self, id: TaskId, title: &str, description: &str) -> RepoResult<()> {
        if title.trim().is_empty() {
            return Err(TaskValidationError::EmptyTitle.into());
        }

        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                title = ?1,
                description = ?2,
                updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
             WHERE id = ?3;",
            params![title, description, id.to_string()],
        )?;
        ensure_changed(changed, id)
    }

    fn set_completed(&self, id: TaskId, completed: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                completed = ?1,
                updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
             WHERE id = ?2;",
            params![bool_to_int(completed), id.to_string()],
        )?;
        ensure_changed(changed, id)
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1;", [id.to_string()])?;
        ensure_changed(changed, id)
    }

    fn apply_priority_batch(&self, updates: &[PriorityUpdate]) -> RepoResult<CommitReport> {
        let mut report = CommitReport::default();
        if updates.is_empty() {
            return Ok(report);
        }

        // Dropping the transaction without commit rolls every update back.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(
                "UPDATE tasks
                 SET
                    priority = ?1,
                    updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
                 WHERE id = ?2 AND completed = 0;",
            )?;
            for update in updates {
                let changed = match stmt
                    .execute(params![update.priority.as_str(), update.id.to_string()])
                {
                    Ok(changed) => changed,
                    Err(err) => {
                        error!(
                            "event=priority_batch module=repo status=error batch_size={} error={}",
                            updates.len(),
                            err
                        );
                        return Err(err.into());
                    }
                };
                if changed == 0 {
                    report.skipped.push(update.id);
                } else {
                    report.applied.push(update.id);
                }
            }
        }
        tx.commit()?;

        info!(
            "event=priority_batch module=repo status=ok applied={} skipped={}",
            report.applied.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn data_version(&self) -> RepoResult<i64> {
        let version = self
            .conn
            .query_row("PRAGMA data_version;", [], |row| row.get::<_, i64>(0))?;
        Ok(version)
    }
}

fn ensure_changed(changed: usize, id: TaskId) -> RepoResult<()> {
    if changed == 0 {
        return Err(RepoError::NotFound(id));
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let exists = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            [table],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text)
        .map_err(|_| RepoError::InvalidData(format!("invalid id value `{id_text}` in tasks.id")))?;

    let priority = match row.get::<_, Option<String>>("priority")? {
        Some(value) => Some(value.parse::<Priority>().map_err(|_| {
            RepoError::InvalidData(format!("invalid priority `{value}` in tasks.priority"))
        })?),
        None => None,
    };

    let completed = match row.get::<_, i64>("completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid completed value `{other}` in tasks.completed"
            )));
        }
    };

    let task = Task {
        id,
        title: row.get("title")?,
        description: row.get("description")?,
        completed,
        created_at: row.get("created_at")?,
        priority,
    };
    task.validate()?;
    Ok(task)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
