/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Client for an OpenAI-compatible inference endpoint.
//!
//! Only two calls are made: `GET {base}/models` as a reachability probe and
//! `POST {base}/chat/completions` carrying the remediation prompt. Every call
//! here is a single attempt; retries and health bookkeeping belong to
//! [`super::RemediationEngine`].

use crate::error::ControllerError;
use crate::models::{FileUpdate, SourceFiles};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use tournesol_utils::config::Inference;
use tournesol_utils::logging::prelude::*;

/// Deadline for the `/models` probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const SYSTEM_PROMPT: &str =
    "You are an expert Kubernetes administrator. Respond only with the requested JSON format.";

const RESPONSE_INSTRUCTIONS: &str = r#"# Instructions for Response
Analyze the above error and solution recommendation along with the provided files.
If the error can be fixed by editing YAML files, please provide the updated file contents.

Respond ONLY with a JSON array of files to be updated, in this exact format:
[
  {
    "path": "relative/path/to/file.yaml",
    "content": "complete updated file content"
  }
]

If the error is in the application code itself or cannot be fixed by editing YAML files,
respond with an empty array: []
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub stream: bool,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
}

impl InferenceClient {
    pub fn new(settings: &Inference) -> Result<Self, ControllerError> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            request_timeout: Duration::from_secs(settings.timeout_seconds),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Any 2xx from `/models` within [`PROBE_TIMEOUT`] counts as healthy.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        debug!("Probing inference endpoint at {}", url);

        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Inference endpoint health check passed ({})", response.status());
                true
            }
            Ok(response) => {
                warn!("Inference endpoint health check failed with status {}", response.status());
                false
            }
            Err(e) => {
                warn!("Inference endpoint health check failed: {}", e);
                false
            }
        }
    }

    /// One chat completion attempt. Returns the first choice's message text.
    pub async fn complete(&self, prompt: &str) -> Result<String, ControllerError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.chat_request(prompt);

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Chat request to {} failed: {}", url, e);
                ControllerError::from(e)
            })?;

        let status = response.status();
        debug!("Chat response {} received in {:?}", status, started.elapsed());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControllerError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ControllerError::MalformedResponse(format!("chat response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| {
                ControllerError::MalformedResponse("chat response has no message content".into())
            })?;

        debug!("Chat response preview: {}", preview(&content, 200));
        Ok(content)
    }

    pub fn chat_request<'a>(&'a self, prompt: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage::new("system", SYSTEM_PROMPT),
                ChatMessage::new("user", prompt),
            ],
            temperature: self.temperature,
            stream: false,
            max_tokens: self.max_tokens,
        }
    }
}

/// Prompt embedding the solution text, every file labelled by path in path
/// order, and the response-format instructions.
pub fn build_prompt(files: &SourceFiles, solution: &str) -> String {
    let mut prompt = String::new();
    let _ = write!(prompt, "# Problem Solution from K8SGPT\n\n{}\n\n", solution);
    prompt.push_str("# Related Files\n\n");
    for (path, content) in files {
        let _ = write!(prompt, "## {}\n```yaml\n{}\n```\n\n", path, content);
    }
    prompt.push_str(RESPONSE_INSTRUCTIONS);
    prompt
}

/// Parses the JSON array of `{path, content}` objects out of a model reply,
/// discarding any prose before the first `[` and after the last `]`.
pub fn extract_file_updates(content: &str) -> Result<Vec<FileUpdate>, ControllerError> {
    let candidate = match (content.find('['), content.rfind(']')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content,
    };
    serde_json::from_str(candidate)
        .map_err(|e| ControllerError::MalformedResponse(format!("file updates: {}", e)))
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
