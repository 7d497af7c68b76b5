//! Command-line surface for Taskwise.
//!
//! # Responsibility
//! - Map one command per invocation onto `TaskService` use cases.
//! - Render the Active/Completed board.
//! - Turn every failure into a one-line notice and a non-zero exit code.

use clap::{Parser, Subcommand};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use taskwise_core::{
    init_from_config, open_configured_store, AppConfig, ConfigError, FeedEvent, NewTask,
    OpenAiChatBackend, PrioritizeOutcome, Prioritizer, RepoError, SqliteTaskRepository,
    SubscriptionState, Task, TaskBoard, TaskEdit, TaskId, TaskService, TaskServiceError,
    NO_ACTIVE_TASKS_NOTICE,
};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "taskwise", version, about = "To-do list with AI prioritization")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "taskwise.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add a new task.
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Edit title and/or description of a task.
    Edit {
        /// Task id or unique id prefix.
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Mark a task completed, or active again.
    Toggle { id: String },
    /// Delete a task after confirmation.
    Delete {
        id: String,
        /// Skip the interactive confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// Show active and completed tasks.
    List,
    /// Ask the language model to prioritize active tasks.
    Prioritize,
    /// Print the board every time the task list changes.
    Watch {
        /// How often to check for changes made by other clients.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

/// Failures of one CLI invocation.
#[derive(Debug)]
enum CliError {
    Service(TaskServiceError),
    UnknownId(String),
    AmbiguousId(String),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Service(err) => write!(f, "{err}"),
            Self::UnknownId(input) => write!(f, "no task matches id `{input}`"),
            Self::AmbiguousId(input) => {
                write!(f, "id prefix `{input}` matches more than one task")
            }
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Service(err) => Some(err),
            Self::UnknownId(_) | Self::AmbiguousId(_) => None,
        }
    }
}

impl From<TaskServiceError> for CliError {
    fn from(value: TaskServiceError) -> Self {
        Self::Service(value)
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Service(value.into())
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Service(value.into())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::load(&cli.config)?;
    if let Err(err) = init_from_config(&config.logging) {
        // Logging is optional; keep going without it.
        eprintln!("warning: logging disabled: {err}");
    }

    let conn = open_configured_store(&config)?;
    let service = TaskService::new(SqliteTaskRepository::try_new(&conn)?);

    match cli.command {
        Command::Add { title, description } => {
            let task = service.add_task(&NewTask::new(title, description))?;
            println!("added {}", short_id(task.id));
        }
        Command::Edit {
            id,
            title,
            description,
        } => {
            let current = resolve_task(&service, &id)?;
            let edit = TaskEdit {
                title: title.unwrap_or(current.title),
                description: description.unwrap_or(current.description),
            };
            let task = service.edit_task(current.id, &edit)?;
            println!("updated {}", short_id(task.id));
        }
        Command::Toggle { id } => {
            let task = resolve_task(&service, &id)?;
            let task = service.toggle_completed(task.id)?;
            let state = if task.completed { "completed" } else { "active" };
            println!("{} is now {state}", short_id(task.id));
        }
        Command::Delete { id, yes } => {
            let task = resolve_task(&service, &id)?;
            let pending = service.request_delete(task.id)?;
            if !yes && !confirm(&format!("Delete \"{}\"? [y/N] ", pending.title())) {
                println!("kept {}", short_id(pending.id()));
                return Ok(());
            }
            let deleted = pending.id();
            service.confirm_delete(pending)?;
            println!("deleted {}", short_id(deleted));
        }
        Command::List => {
            print_board(&service.board()?);
        }
        Command::Prioritize => {
            let prioritizer = Prioritizer::new(OpenAiChatBackend::new(&config.llm));
            match service.prioritize_active(&prioritizer)? {
                PrioritizeOutcome::NoActiveTasks => println!("{NO_ACTIVE_TASKS_NOTICE}"),
                PrioritizeOutcome::Applied(report) => {
                    println!("Your tasks have been prioritized by AI.");
                    if !report.skipped.is_empty() {
                        println!(
                            "{} task(s) changed while prioritizing and were left as is.",
                            report.skipped.len()
                        );
                    }
                    print_board(&service.board()?);
                }
            }
        }
        Command::Watch { interval_ms } => {
            watch(&service, Duration::from_millis(interval_ms.max(50)))?;
        }
    }

    Ok(())
}

fn watch(
    service: &TaskService<SqliteTaskRepository<'_>>,
    interval: Duration,
) -> Result<(), CliError> {
    let subscription = service.subscribe();
    let mut state = SubscriptionState::default();
    loop {
        if let Some(event) = subscription.next_timeout(interval) {
            if let FeedEvent::SnapshotFailed(message) = &event {
                warn!("event=watch module=cli status=error");
                eprintln!("error: {message}");
            }
            state.apply(event);
            if let SubscriptionState::Ready(_) = state {
                print_board(&state.board());
            }
        }
        service.poll_external_changes()?;
    }
}

/// Accepts a full id or a prefix matching exactly one task.
fn resolve_task(
    service: &TaskService<SqliteTaskRepository<'_>>,
    input: &str,
) -> Result<Task, CliError> {
    let needle = input.trim().to_ascii_lowercase();
    if let Ok(id) = Uuid::parse_str(&needle) {
        return Ok(service
            .get_task(id)?
            .ok_or(TaskServiceError::NotFound(id))?);
    }

    let mut matches = service
        .list_tasks()?
        .into_iter()
        .filter(|task| !needle.is_empty() && task.id.to_string().starts_with(&needle));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task),
        (Some(_), Some(_)) => Err(CliError::AmbiguousId(input.to_string())),
        (None, _) => Err(CliError::UnknownId(input.to_string())),
    }
}

fn confirm(question: &str) -> bool {
    print!("{question}");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_board(board: &TaskBoard) {
    println!("Active ({})", board.active.len());
    if board.active.is_empty() {
        println!("  (none)");
    }
    for task in &board.active {
        print_task(task);
    }
    println!("Completed ({})", board.completed.len());
    if board.completed.is_empty() {
        println!("  (none)");
    }
    for task in &board.completed {
        print_task(task);
    }
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    let priority = task
        .visible_priority()
        .map(|priority| format!(" [{priority}]"))
        .unwrap_or_default();
    println!("  [{mark}] {} {}{priority}", short_id(task.id), task.title);
    if !task.description.is_empty() {
        println!("        {}", task.description);
    }
}

fn short_id(id: TaskId) -> String {
    id.to_string().chars().take(8).collect()
}
