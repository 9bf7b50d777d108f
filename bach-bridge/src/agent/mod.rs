//! Conversation driver: model selection, system prompt, the tool-calling
//! loop and the chat session the REPL talks to.

mod chat;
mod models;
mod prompt;
mod tool_loop;

pub use chat::ChatSession;
pub use models::ModelSelector;
pub use prompt::{load_system_prompt, DEFAULT_SYSTEM_PROMPT, GREETING_REQUEST};
pub use tool_loop::{ConversationState, LoopOutcome, LoopSettings, ToolLoop};
