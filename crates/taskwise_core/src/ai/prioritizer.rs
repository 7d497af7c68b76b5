//! Prioritization request/response cycle and reply validation.

use super::backend::CompletionBackend;
use super::prompt::{build_prompt, PrioritizeInput};
use super::{GenerationError, GenerationResult};
use crate::model::task::{Priority, TaskId};
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n?(.*?)\s*```\s*$").expect("valid code fence regex")
});

/// One validated reply row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrioritizedTask {
    /// Id echoed back by the model; may not belong to any live task.
    /// `None` when the model only returned title and description.
    pub id: Option<TaskId>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

/// Prioritization service over a completion backend.
pub struct Prioritizer<B: CompletionBackend> {
    backend: B,
}

impl<B: CompletionBackend> Prioritizer<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Asks the model for a priority per task and validates the reply.
    ///
    /// # Contract
    /// - Empty input returns an empty result without a backend call.
    /// - Output order and length are not tied to the input.
    ///
    /// # Errors
    /// - Any transport failure or reply shape violation fails the whole call.
    pub fn prioritize(&self, inputs: &[PrioritizeInput]) -> GenerationResult<Vec<PrioritizedTask>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let started_at = Instant::now();
        info!(
            "event=ai_prioritize module=ai status=start task_count={}",
            inputs.len()
        );

        let result = self
            .backend
            .complete(&build_prompt(inputs))
            .and_then(|content| parse_prioritized_tasks(&content));

        match &result {
            Ok(rows) => info!(
                "event=ai_prioritize module=ai status=ok duration_ms={} task_count={} row_count={}",
                started_at.elapsed().as_millis(),
                inputs.len(),
                rows.len()
            ),
            Err(err) => error!(
                "event=ai_prioritize module=ai status=error duration_ms={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        result
    }
}

/// Parses and validates the model's message content.
///
/// Accepts `{"tasks": [...]}` or a bare array, optionally wrapped in a
/// Markdown code fence.
pub fn parse_prioritized_tasks(content: &str) -> GenerationResult<Vec<PrioritizedTask>> {
    let payload = match CODE_FENCE_RE.captures(content) {
        Some(captures) => captures.get(1).map_or("", |inner| inner.as_str()),
        None => content.trim(),
    };

    let value: Value = serde_json::from_str(payload)
        .map_err(|err| GenerationError::Malformed(format!("content is not JSON: {err}")))?;

    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(mut object) => match object.remove("tasks") {
            Some(Value::Array(rows)) => rows,
            Some(_) => {
                return Err(GenerationError::Malformed(
                    "`tasks` is not an array".to_string(),
                ))
            }
            None => {
                return Err(GenerationError::Malformed(
                    "object has no `tasks` array".to_string(),
                ))
            }
        },
        _ => {
            return Err(GenerationError::Malformed(
                "expected an array of tasks".to_string(),
            ))
        }
    };

    let mut seen = HashSet::with_capacity(rows.len());
    let mut tasks = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let Value::Object(fields) = row else {
            return Err(GenerationError::Malformed(format!(
                "row {index} is not an object"
            )));
        };

        let id = optional_id(&fields, index)?;
        if let Some(id) = id {
            if !seen.insert(id) {
                return Err(GenerationError::DuplicateId(id.to_string()));
            }
        }

        let priority_text = string_field(&fields, index, "priority")?;
        let priority =
            priority_text
                .parse::<Priority>()
                .map_err(|_| GenerationError::InvalidPriority {
                    index,
                    value: priority_text.to_string(),
                })?;

        tasks.push(PrioritizedTask {
            id,
            title: string_field(&fields, index, "title")?.to_string(),
            description: string_field(&fields, index, "description")?.to_string(),
            priority,
        });
    }

    Ok(tasks)
}

/// Reads the echoed `id`; rows without one fall back to text matching.
fn optional_id(fields: &Map<String, Value>, index: usize) -> GenerationResult<Option<TaskId>> {
    match fields.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Uuid::parse_str(text.trim())
            .map(Some)
            .map_err(|_| GenerationError::InvalidId {
                index,
                value: text.clone(),
            }),
        Some(_) => Err(GenerationError::Malformed(format!(
            "row {index} field `id` is not a string"
        ))),
    }
}

fn string_field<'a>(
    fields: &'a Map<String, Value>,
    index: usize,
    field: &'static str,
) -> GenerationResult<&'a str> {
    match fields.get(field) {
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(Value::Null) | None => Err(GenerationError::MissingField { index, field }),
        Some(_) => Err(GenerationError::Malformed(format!(
            "row {index} field `{field}` is not a string"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_prioritized_tasks, Prioritizer};
    use crate::ai::backend::CompletionBackend;
    use crate::ai::prompt::{PrioritizeInput, PromptMessages};
    use crate::ai::{GenerationError, GenerationResult};
    use crate::model::task::Priority;
    use std::cell::Cell;
    use uuid::Uuid;

    const ID_A: &str = "00000000-0000-4000-8000-00000000000a";
    const ID_B: &str = "00000000-0000-4000-8000-00000000000b";

    struct CountingBackend {
        calls: Cell<usize>,
        reply: String,
    }

    impl CompletionBackend for CountingBackend {
        fn complete(&self, _prompt: &PromptMessages) -> GenerationResult<String> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn parses_object_envelope() {
        let content = format!(
            r#"{{"tasks":[
                {{"id":"{ID_A}","title":"A","description":"x","priority":"High"}},
                {{"id":"{ID_B}","title":"B","description":"","priority":"Low"}}
            ]}}"#
        );
        let rows = parse_prioritized_tasks(&content).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].priority, Priority::High);
        assert_eq!(rows[1].description, "");
    }

    #[test]
    fn parses_bare_array_inside_code_fence() {
        let content = format!(
            "```json\n[{{\"id\":\"{ID_A}\",\"title\":\"A\",\"description\":\"x\",\"priority\":\"Medium\"}}]\n```"
        );
        let rows = parse_prioritized_tasks(&content).unwrap();
        assert_eq!(rows[0].priority, Priority::Medium);
        assert_eq!(rows[0].id, Some(Uuid::parse_str(ID_A).unwrap()));
    }

    #[test]
    fn one_invalid_label_fails_the_whole_reply() {
        let content = format!(
            r#"[{{"id":"{ID_A}","title":"A","description":"x","priority":"High"}},
                {{"id":"{ID_B}","title":"B","description":"y","priority":"Urgent"}}]"#
        );
        let err = parse_prioritized_tasks(&content).unwrap_err();
        assert_eq!(
            err,
            GenerationError::InvalidPriority {
                index: 1,
                value: "Urgent".to_string()
            }
        );
    }

    #[test]
    fn missing_field_fails_the_whole_reply() {
        let content = format!(r#"[{{"id":"{ID_A}","title":"A","priority":"High"}}]"#);
        let err = parse_prioritized_tasks(&content).unwrap_err();
        assert_eq!(
            err,
            GenerationError::MissingField {
                index: 0,
                field: "description"
            }
        );
    }

    #[test]
    fn rows_without_id_are_accepted_for_text_matching() {
        let content = r#"[{"title":"A","description":"x","priority":"High"},
                          {"title":"B","description":"y","priority":"Low"}]"#;
        let rows = parse_prioritized_tasks(content).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.id.is_none()));
        assert_eq!(rows[1].priority, Priority::Low);
    }

    #[test]
    fn bad_or_repeated_id_is_rejected() {
        let bad = r#"[{"id":"task-1","title":"A","description":"x","priority":"High"}]"#;
        assert!(matches!(
            parse_prioritized_tasks(bad),
            Err(GenerationError::InvalidId { index: 0, .. })
        ));

        let repeated = format!(
            r#"[{{"id":"{ID_A}","title":"A","description":"x","priority":"High"}},
                {{"id":"{ID_A}","title":"A","description":"x","priority":"Low"}}]"#
        );
        assert!(matches!(
            parse_prioritized_tasks(&repeated),
            Err(GenerationError::DuplicateId(_))
        ));
    }

    #[test]
    fn non_json_content_is_malformed() {
        let err = parse_prioritized_tasks("Sure! Here are your tasks.").unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn empty_input_skips_backend() {
        let prioritizer = Prioritizer::new(CountingBackend {
            calls: Cell::new(0),
            reply: String::new(),
        });
        let rows = prioritizer.prioritize(&[]).unwrap();
        assert!(rows.is_empty());
        assert_eq!(prioritizer.backend().calls.get(), 0);
    }

    #[test]
    fn non_empty_input_calls_backend_once() {
        let id = Uuid::parse_str(ID_A).unwrap();
        let prioritizer = Prioritizer::new(CountingBackend {
            calls: Cell::new(0),
            reply: format!(
                r#"{{"tasks":[{{"id":"{ID_A}","title":"A","description":"","priority":"Low"}}]}}"#
            ),
        });
        let rows = prioritizer
            .prioritize(&[PrioritizeInput {
                id,
                title: "A".to_string(),
                description: String::new(),
            }])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(prioritizer.backend().calls.get(), 1);
    }
}
