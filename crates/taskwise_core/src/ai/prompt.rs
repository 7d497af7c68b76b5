//! Prompt construction for the prioritization call.

use crate::model::task::{Task, TaskId};

const SYSTEM_PROMPT: &str = "You are a task prioritization expert. \
You will receive a list of tasks with ids, titles and descriptions. \
Prioritize each task as High, Medium, or Low based on its urgency and importance.";

const RESPONSE_INSTRUCTIONS: &str = "Return only a JSON object of the form \
{\"tasks\": [{\"id\": \"...\", \"title\": \"...\", \"description\": \"...\", \"priority\": \"High\"}]} \
with one entry per task. Copy each task's id, title and description exactly as given, \
and set \"priority\" to exactly one of \"High\", \"Medium\" or \"Low\".";

/// One task as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrioritizeInput {
    pub id: TaskId,
    pub title: String,
    pub description: String,
}

impl From<&Task> for PrioritizeInput {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
        }
    }
}

/// System and user message pair for a chat-completions request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessages {
    pub system: String,
    pub user: String,
}

/// Builds the instruction that embeds every task as an enumerated line.
///
/// Titles and descriptions are JSON-quoted so user text cannot break the
/// list structure.
pub fn build_prompt(inputs: &[PrioritizeInput]) -> PromptMessages {
    let mut user = String::from("Here are the tasks:\n\n");
    for (index, input) in inputs.iter().enumerate() {
        user.push_str(&format!(
            "{}. id: {}, title: {}, description: {}\n",
            index + 1,
            input.id,
            quote(&input.title),
            quote(&input.description),
        ));
    }
    user.push('\n');
    user.push_str(RESPONSE_INSTRUCTIONS);

    PromptMessages {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
