//! Chat-completions LLM client.
//!
//! Issues calls at a *role* (mapped to temperature + max tokens by
//! [`crate::config::Config`]), retrying only on transport failure —
//! never on a well-formed application error.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::errors::LlmError;
use crate::llm::retry::BackoffPolicy;

/// One turn of the chat transcript sent to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

/// One call's parameters, independent of the wire format.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub role: &'static str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// When set, the backend must return JSON matching this schema.
    pub json_schema: Option<Value>,
}

/// Abstract chat-completions backend. Production code talks to
/// [`HttpLlmClient`]; phase-handler tests can substitute a stub.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// reqwest-based OpenAI-compatible chat-completions client.
pub struct HttpLlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    backoff: BackoffPolicy,
}

impl HttpLlmClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            backoff: BackoffPolicy::default(),
        }
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if let Some(schema) = &request.json_schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": schema,
            });
        }
        body
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    #[instrument(skip(self, request), fields(role = request.role))]
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let role = request.role;
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        let body = self.body(&request);

        let mut last_err = None;
        for attempt in 0..self.backoff.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.backoff.delay_for(attempt)).await;
            }

            let sent = self.http.post(&url).json(&body).send().await;
            match sent {
                Ok(response) if response.status().is_success() => {
                    let parsed: Value = response
                        .json()
                        .await
                        .map_err(|e| LlmError::Transport(role, e))?;
                    return extract_content(&parsed, role);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retryable = response.status().is_server_error();
                    let body_text = response.text().await.unwrap_or_default();
                    if !retryable {
                        return Err(LlmError::BadStatus { role, status, body: body_text });
                    }
                    warn!(role, status, attempt, "llm call returned retryable status");
                    last_err = Some(LlmError::BadStatus { role, status, body: body_text });
                }
                Err(e) => {
                    warn!(role, attempt, error = %e, "llm transport error");
                    last_err = Some(LlmError::Transport(role, e));
                }
            }
        }

        match last_err {
            Some(_) => Err(LlmError::RetriesExhausted { role, attempts: self.backoff.max_attempts }),
            None => Err(LlmError::RetriesExhausted { role, attempts: self.backoff.max_attempts }),
        }
    }
}

fn extract_content(parsed: &Value, role: &'static str) -> Result<String, LlmError> {
    parsed
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| LlmError::MalformedOutput(role, "missing choices[0].message.content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_content_reads_standard_shape() {
        let parsed = serde_json::json!({
            "choices": [{"message": {"content": "hello"}}]
        });
        assert_eq!(extract_content(&parsed, "planner").unwrap(), "hello");
    }

    #[test]
    fn extract_content_errors_on_missing_field() {
        let parsed = serde_json::json!({"choices": []});
        let err = extract_content(&parsed, "planner").unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput("planner", _)));
    }
}
