//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record and its priority label.
//! - Validate user-editable fields before they reach storage.
//! - Derive the active/completed partition used by every view.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - `title` is never empty (after trimming whitespace).
//! - `priority`, when present, is exactly one of `High|Medium|Low`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier for every task, assigned by the store on creation.
pub type TaskId = Uuid;

/// Priority label assigned by the prioritization cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Every accepted label, in descending urgency.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Returns the exact wire/storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a priority label is not one of the three accepted values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPriority(pub String);

impl Display for InvalidPriority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid priority `{}`; expected High|Medium|Low",
            self.0
        )
    }
}

impl Error for InvalidPriority {}

impl FromStr for Priority {
    type Err = InvalidPriority;

    /// Parses a label with exact, case-sensitive matching.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "High" => Ok(Self::High),
            "Medium" => Ok(Self::Medium),
            "Low" => Ok(Self::Low),
            other => Err(InvalidPriority(other.to_string())),
        }
    }
}

/// Validation errors for user-editable task fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    /// Title is empty or whitespace only.
    EmptyTitle,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "task title cannot be empty"),
        }
    }
}

impl Error for TaskValidationError {}

/// Canonical persisted task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Empty string when the user left it blank.
    pub description: String,
    pub completed: bool,
    /// Unix epoch milliseconds, assigned by the store.
    pub created_at: i64,
    /// Set only by the prioritization cycle. Kept after completion.
    pub priority: Option<Priority>,
}

impl Task {
    /// Validates persisted-state invariants.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        validate_title(&self.title)
    }

    /// Returns whether this task belongs to the active partition.
    pub fn is_active(&self) -> bool {
        !self.completed
    }

    /// Priority as shown in views: hidden once the task is completed.
    pub fn visible_priority(&self) -> Option<Priority> {
        if self.completed {
            None
        } else {
            self.priority
        }
    }
}

/// User input for creating a task.
///
/// The title is stored with surrounding whitespace removed; inner text and
/// the description are stored exactly as entered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            title: title.into(),
            description,
        }
    }

    /// Trims the title and defaults the description to an empty string.
    ///
    /// # Errors
    /// - Returns `EmptyTitle` when nothing but whitespace was entered.
    pub fn normalized(&self) -> Result<(String, String), TaskValidationError> {
        let title = self.title.trim().to_string();
        validate_title(&title)?;
        Ok((title, self.description.clone().unwrap_or_default()))
    }
}

/// User input for editing title/description of an existing task.
///
/// Normalized like `NewTask`: the stored title is trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: String,
    pub description: String,
}

impl TaskEdit {
    /// Trims the title; the description is kept verbatim.
    pub fn normalized(&self) -> Result<(String, String), TaskValidationError> {
        let title = self.title.trim().to_string();
        validate_title(&title)?;
        Ok((title, self.description.clone()))
    }
}

/// Active/completed split of a task list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskBoard {
    /// Tasks with `completed == false`, in input order.
    pub active: Vec<Task>,
    /// Tasks with `completed == true`, in input order.
    pub completed: Vec<Task>,
}

impl TaskBoard {
    /// Whether the prioritize action should be offered.
    pub fn can_prioritize(&self) -> bool {
        !self.active.is_empty()
    }
}

/// Splits tasks by their `completed` flag, keeping relative order.
///
/// Every task lands in exactly one partition.
pub fn partition(tasks: impl IntoIterator<Item = Task>) -> TaskBoard {
    let (completed, active) = tasks.into_iter().partition(|task| task.completed);
    TaskBoard { active, completed }
}

fn validate_title(title: &str) -> Result<(), TaskValidationError> {
    if title.trim().is_empty() {
        return Err(TaskValidationError::EmptyTitle);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{partition, NewTask, Priority, Task, TaskEdit, TaskValidationError};
    use uuid::Uuid;

    fn task(title: &str, completed: bool) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            completed,
            created_at: 0,
            priority: None,
        }
    }

    #[test]
    fn priority_parses_exact_labels_only() {
        for priority in Priority::ALL {
            assert_eq!(priority.as_str().parse::<Priority>(), Ok(priority));
        }
        assert!("high".parse::<Priority>().is_err());
        assert!("Urgent".parse::<Priority>().is_err());
        assert!("1".parse::<Priority>().is_err());
    }

    #[test]
    fn priority_serializes_as_plain_label() {
        let json = serde_json::to_string(&Priority::Medium).unwrap();
        assert_eq!(json, "\"Medium\"");
    }

    #[test]
    fn new_task_rejects_blank_title_and_defaults_description() {
        let err = NewTask::new("   ", None).normalized().unwrap_err();
        assert_eq!(err, TaskValidationError::EmptyTitle);

        let (title, description) = NewTask::new("  buy milk ", None).normalized().unwrap();
        assert_eq!(title, "buy milk");
        assert_eq!(description, "");
    }

    #[test]
    fn normalization_trims_only_the_title_edges() {
        let (title, description) = NewTask::new(" pay  rent ", Some("  by the 1st\n".to_string()))
            .normalized()
            .unwrap();
        assert_eq!(title, "pay  rent");
        assert_eq!(description, "  by the 1st\n");

        let edit = TaskEdit {
            title: "\tcall  mom ".to_string(),
            description: " ".to_string(),
        };
        assert_eq!(
            edit.normalized().unwrap(),
            ("call  mom".to_string(), " ".to_string())
        );
    }

    #[test]
    fn edit_rejects_blank_title() {
        let edit = TaskEdit {
            title: "\t".to_string(),
            description: "keep".to_string(),
        };
        assert!(edit.normalized().is_err());
    }

    #[test]
    fn partition_places_every_task_exactly_once() {
        let tasks = vec![
            task("a", false),
            task("b", true),
            task("c", false),
            task("d", true),
        ];
        let board = partition(tasks.clone());

        assert_eq!(board.active.len() + board.completed.len(), tasks.len());
        assert!(board.active.iter().all(|t| !t.completed));
        assert!(board.completed.iter().all(|t| t.completed));
        let active_titles: Vec<_> = board.active.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(active_titles, vec!["a", "c"]);
        assert!(board.can_prioritize());
    }

    #[test]
    fn completed_task_hides_priority() {
        let mut done = task("done", true);
        done.priority = Some(Priority::High);
        assert_eq!(done.visible_priority(), None);
        done.completed = false;
        assert_eq!(done.visible_priority(), Some(Priority::High));
    }

    #[test]
    fn empty_board_cannot_prioritize() {
        let board = partition(vec![task("x", true)]);
        assert!(!board.can_prioritize());
    }
}
