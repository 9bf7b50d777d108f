//! HTTP client for an Ollama-compatible chat server

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::types::{ChatRequest, ChatResponse, TagsResponse};

/// Errors from the chat backend
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The server does not have the requested model installed
    #[error("model '{model}' is not installed")]
    ModelNotFound { model: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Something that answers chat requests
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Names of installed models
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;
}

/// Map an error status to [`LlmError`], picking out the missing-model case
pub fn classify_error(status: u16, body: &str, model: &str) -> LlmError {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    let lower = detail.to_lowercase();
    if status == StatusCode::NOT_FOUND.as_u16() && lower.contains("model") && lower.contains("not found") {
        return LlmError::ModelNotFound {
            model: model.to_string(),
        };
    }

    LlmError::Api {
        status,
        message: detail,
    }
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), "Chat request");

        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body, &request.model));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse chat response: {e}")))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse model list: {e}")))?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| m.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_model_not_found() {
        let err = classify_error(404, r#"{"error":"model 'qwen2.5:72b' not found"}"#, "qwen2.5:72b");
        assert!(matches!(err, LlmError::ModelNotFound { model } if model == "qwen2.5:72b"));
    }

    #[test]
    fn test_classify_plain_text_not_found() {
        let err = classify_error(404, "model \"x\" not found, try pulling it first", "x");
        assert!(matches!(err, LlmError::ModelNotFound { .. }));
    }

    #[test]
    fn test_classify_other_404_is_api_error() {
        let err = classify_error(404, "404 page not found", "x");
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "404 page not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_classify_server_error() {
        let err = classify_error(500, r#"{"error":"out of memory"}"#, "x");
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("out of memory"));
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = OllamaClient::new("http://localhost:11434/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }
}
