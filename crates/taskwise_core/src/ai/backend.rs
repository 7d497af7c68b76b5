//! Chat-completions transport.
//!
//! Supports any server implementing the OpenAI chat completions API
//! (OpenAI, Ollama, vLLM, llama.cpp server, ...).

use super::prompt::PromptMessages;
use super::{GenerationError, GenerationResult};
use crate::config::LlmConfig;
use log::{debug, error};
use std::time::{Duration, Instant};

const MAX_ERROR_BODY_CHARS: usize = 200;

/// One-shot text completion seam used by the prioritizer.
pub trait CompletionBackend {
    /// Sends the prompt and returns the assistant message text.
    fn complete(&self, prompt: &PromptMessages) -> GenerationResult<String>;
}

/// Blocking OpenAI-compatible backend.
pub struct OpenAiChatBackend {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout_secs: u64,
}

impl OpenAiChatBackend {
    pub fn new(config: &LlmConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            endpoint: chat_completions_url(&config.base_url),
            model: config.model.clone(),
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        }
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, prompt: &PromptMessages) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "stream": false,
        })
    }

    fn map_transport_error(&self, err: ureq::Transport) -> GenerationError {
        let timed_out = std::error::Error::source(&err)
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .is_some_and(|io| {
                matches!(
                    io.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
            });
        if timed_out {
            GenerationError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

impl CompletionBackend for OpenAiChatBackend {
    fn complete(&self, prompt: &PromptMessages) -> GenerationResult<String> {
        let started_at = Instant::now();
        let body = self.request_body(prompt).to_string();

        let mut request = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let response = match request.send_string(&body) {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                error!(
                    "event=llm_request module=ai status=error duration_ms={} error_code=http_status http_status={}",
                    started_at.elapsed().as_millis(),
                    status
                );
                return Err(GenerationError::Http {
                    status,
                    body: truncate(&body, MAX_ERROR_BODY_CHARS),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                let err = self.map_transport_error(transport);
                error!(
                    "event=llm_request module=ai status=error duration_ms={} error_code={}",
                    started_at.elapsed().as_millis(),
                    err.code()
                );
                return Err(err);
            }
        };

        let text = response
            .into_string()
            .map_err(|err| GenerationError::Transport(format!("failed to read reply: {err}")))?;
        debug!(
            "event=llm_request module=ai status=ok duration_ms={} reply_bytes={}",
            started_at.elapsed().as_millis(),
            text.len()
        );

        extract_message_content(&text)
    }
}

/// Pulls `choices[0].message.content` out of a chat-completions reply.
pub fn extract_message_content(reply: &str) -> GenerationResult<String> {
    let value: serde_json::Value = serde_json::from_str(reply)
        .map_err(|err| GenerationError::Malformed(format!("reply is not JSON: {err}")))?;

    value["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| {
            GenerationError::Malformed("reply has no choices[0].message.content".to_string())
        })
}

fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{base}/v1/chat/completions")
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    if value.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
