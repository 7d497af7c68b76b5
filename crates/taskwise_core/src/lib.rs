//! Core domain logic for Taskwise.
//! This crate is the single source of truth for task invariants.

pub mod ai;
pub mod config;
pub mod db;
pub mod feed;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use ai::{
    CompletionBackend, GenerationError, OpenAiChatBackend, PrioritizeInput, PrioritizedTask,
    Prioritizer, PromptMessages,
};
pub use config::{AppConfig, ConfigError, LlmConfig, LoggingConfig, StoreConfig};
pub use feed::{FeedEvent, SubscriptionState, TaskFeed, TaskSubscription};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::task::{
    partition, NewTask, Priority, Task, TaskBoard, TaskEdit, TaskId, TaskValidationError,
};
pub use repo::task_repo::{
    CommitReport, PriorityUpdate, RepoError, RepoResult, SqliteTaskRepository, TaskRepository,
};
pub use service::reconcile::reconcile;
pub use service::task_service::{
    open_configured_store, PendingDelete, PrioritizeOutcome, TaskService, TaskServiceError,
    NO_ACTIVE_TASKS_NOTICE,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
