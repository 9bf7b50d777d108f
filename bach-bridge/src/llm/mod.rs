//! Chat backend: request/response types and the Ollama HTTP client

mod client;
mod types;

pub use client::{classify_error, ChatBackend, LlmError, OllamaClient};
pub use types::{ChatMessage, ChatOptions, ChatRequest, ChatResponse, FunctionCall, Role, ToolCall};
