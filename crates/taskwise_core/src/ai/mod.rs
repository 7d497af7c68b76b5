//! AI task prioritization.
//!
//! # Responsibility
//! - Turn active tasks into one natural-language instruction.
//! - Call a hosted chat-completions model exactly once per cycle.
//! - Validate the structured reply before anything reaches storage.
//!
//! # Invariants
//! - A reply is accepted whole or rejected whole; no partial results.
//! - Every accepted row carries `High|Medium|Low`; echoed ids are unique.
//! - No retries; callers decide how to surface a failure.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod backend;
pub mod prioritizer;
pub mod prompt;

pub use backend::{CompletionBackend, OpenAiChatBackend};
pub use prioritizer::{parse_prioritized_tasks, PrioritizedTask, Prioritizer};
pub use prompt::{build_prompt, PrioritizeInput, PromptMessages};

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Failure of one prioritization round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Model endpoint unreachable or connection dropped.
    Transport(String),
    /// No reply within the configured timeout.
    Timeout { timeout_secs: u64 },
    /// Endpoint answered with a non-success status.
    Http { status: u16, body: String },
    /// Reply is not the expected JSON shape.
    Malformed(String),
    MissingField { index: usize, field: &'static str },
    InvalidPriority { index: usize, value: String },
    InvalidId { index: usize, value: String },
    DuplicateId(String),
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "model request failed: {message}"),
            Self::Timeout { timeout_secs } => {
                write!(f, "model request timed out after {timeout_secs}s")
            }
            Self::Http { status, body } => write!(f, "model returned HTTP {status}: {body}"),
            Self::Malformed(message) => write!(f, "model reply is malformed: {message}"),
            Self::MissingField { index, field } => {
                write!(f, "model reply row {index} is missing `{field}`")
            }
            Self::InvalidPriority { index, value } => write!(
                f,
                "model reply row {index} has invalid priority `{value}`; expected High|Medium|Low"
            ),
            Self::InvalidId { index, value } => {
                write!(f, "model reply row {index} has invalid id `{value}`")
            }
            Self::DuplicateId(id) => write!(f, "model reply repeats task id {id}"),
        }
    }
}

impl Error for GenerationError {}

impl GenerationError {
    /// Stable short code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Http { .. } => "http_status",
            Self::Malformed(_) => "malformed",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidPriority { .. } => "invalid_priority",
            Self::InvalidId { .. } => "invalid_id",
            Self::DuplicateId(_) => "duplicate_id",
        }
    }
}
