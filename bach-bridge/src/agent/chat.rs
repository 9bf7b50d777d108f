//! REPL-facing chat session over the tool loop

use tracing::debug;

use super::prompt::GREETING_REQUEST;
use super::tool_loop::{ConversationState, LoopOutcome, ToolLoop};
use crate::error::Result;
use crate::llm::ChatMessage;

pub struct ChatSession {
    tool_loop: ToolLoop,
    system_prompt: String,
    history: Vec<ChatMessage>,
    /// Send the whole history each turn rather than only the latest message
    stateful: bool,
}

impl ChatSession {
    pub fn new(tool_loop: ToolLoop, system_prompt: impl Into<String>, stateful: bool) -> Self {
        Self {
            tool_loop,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            stateful,
        }
    }

    /// Pick the first installed model before the first message
    pub async fn select_model(&mut self) -> Option<String> {
        let backend = self.tool_loop.backend_handle();
        self.tool_loop
            .models_mut()
            .probe(backend.as_ref())
            .await
            .map(str::to_string)
    }

    /// Ask the model for its one-line introduction
    pub async fn greet(&mut self) -> Result<LoopOutcome> {
        self.chat(GREETING_REQUEST).await
    }

    /// Run one user message through the tool loop
    ///
    /// Stateful sessions keep the user turn and every turn the loop added,
    /// but only once the loop succeeds. Stateless sessions keep nothing.
    pub async fn chat(&mut self, text: &str) -> Result<LoopOutcome> {
        let user = ChatMessage::user(text);

        let mut turns = vec![ChatMessage::system(self.system_prompt.clone())];
        if self.stateful {
            turns.extend(self.history.iter().cloned());
        }
        turns.push(user);
        let mut conversation = ConversationState::with_turns(turns);
        let start = conversation.len() - 1;

        let outcome = self.tool_loop.run(&mut conversation).await?;

        if self.stateful {
            self.history
                .extend(conversation.turns()[start..].iter().cloned());
        }
        debug!(history = self.history.len(), rounds = outcome.rounds(), "Chat turn finished");

        Ok(outcome)
    }

    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tool_loop.tool_names()
    }

    pub fn current_model(&self) -> Option<&str> {
        self.tool_loop.current_model()
    }

    pub fn is_stateful(&self) -> bool {
        self.stateful
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use bach_protocol::InboundEvent;

    use crate::agent::{LoopSettings, ModelSelector};
    use crate::config::ToolTier;
    use crate::correlator::ReplyMatch;
    use crate::error::BridgeError;
    use crate::llm::{ChatBackend, ChatRequest, ChatResponse, LlmError, Role, ToolCall};
    use crate::tools::{HostChannel, ToolExecutor, ToolRegistry};

    /// Answers tool calls once, then text; records message counts
    struct EchoBackend {
        pending_call: Mutex<bool>,
        fail_next: Mutex<bool>,
        installed: Vec<String>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl EchoBackend {
        fn new(with_tool_call: bool) -> Self {
            Self {
                pending_call: Mutex::new(with_tool_call),
                fail_next: Mutex::new(false),
                installed: vec!["modelB".into()],
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for EchoBackend {
        async fn chat(&self, request: &ChatRequest) -> std::result::Result<ChatResponse, LlmError> {
            self.seen.lock().push(request.messages.clone());
            if std::mem::take(&mut *self.fail_next.lock()) {
                return Err(LlmError::Api {
                    status: 500,
                    message: "out of memory".into(),
                });
            }
            let mut pending = self.pending_call.lock();
            let message = if *pending {
                *pending = false;
                ChatMessage::assistant_with_calls("", vec![ToolCall::new("clear", json!({}))])
            } else {
                let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
                ChatMessage::assistant(format!("echo: {last}"))
            };
            Ok(ChatResponse {
                model: request.model.clone(),
                message,
                done: true,
            })
        }

        async fn list_models(&self) -> std::result::Result<Vec<String>, LlmError> {
            Ok(self.installed.clone())
        }
    }

    struct NullHost;

    #[async_trait]
    impl HostChannel for NullHost {
        async fn send_command(&self, _command: &str) -> Result<()> {
            Ok(())
        }

        async fn send_and_wait(
            &self,
            _command: &str,
            _timeout: Duration,
            _matcher: ReplyMatch,
        ) -> Result<InboundEvent> {
            Err(BridgeError::TransportFailed)
        }

        fn default_timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    fn session(backend: Arc<EchoBackend>, stateful: bool) -> ChatSession {
        session_with_rounds(backend, stateful, 5)
    }

    fn session_with_rounds(backend: Arc<EchoBackend>, stateful: bool, max_rounds: u32) -> ChatSession {
        let executor = ToolExecutor::new(Arc::new(ToolRegistry::new()), Arc::new(NullHost));
        let models = ModelSelector::new(vec!["modelA".into(), "modelB".into()]);
        let settings = LoopSettings {
            max_rounds,
            temperature: 0.35,
            max_tokens: 128,
            tier: ToolTier::Core,
        };
        ChatSession::new(ToolLoop::new(backend, executor, models, settings), "sys", stateful)
    }

    #[tokio::test]
    async fn test_stateful_history_keeps_tool_turns() {
        let backend = Arc::new(EchoBackend::new(true));
        let mut chat = session(Arc::clone(&backend), true);

        let outcome = chat.chat("wipe it").await.unwrap();
        assert!(outcome.text().starts_with("echo: "));
        assert!(outcome.text().contains("\"success\":true"));

        let roles: Vec<Role> = chat.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);

        chat.chat("again").await.unwrap();
        // system + 4 earlier turns + new user
        assert_eq!(backend.seen.lock().last().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_stateless_sends_only_latest_message() {
        let backend = Arc::new(EchoBackend::new(false));
        let mut chat = session(Arc::clone(&backend), false);

        chat.chat("first").await.unwrap();
        let outcome = chat.chat("second").await.unwrap();
        assert_eq!(outcome.text(), "echo: second");

        let last = backend.seen.lock().last().unwrap().clone();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].role, Role::System);
        assert!(chat.history().is_empty());
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_history_untouched() {
        let backend = Arc::new(EchoBackend::new(false));
        let mut chat = session(Arc::clone(&backend), true);
        *backend.fail_next.lock() = true;

        assert!(matches!(
            chat.chat("first").await,
            Err(BridgeError::Backend(LlmError::Api { status: 500, .. }))
        ));
        assert!(chat.history().is_empty());

        chat.chat("second").await.unwrap();
        let roles: Vec<Role> = backend.seen.lock().last().unwrap().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(chat.history().len(), 2);
    }

    #[tokio::test]
    async fn test_round_limited_turn_is_not_duplicated() {
        let backend = Arc::new(EchoBackend::new(true));
        let mut chat = session_with_rounds(Arc::clone(&backend), true, 1);

        let outcome = chat.chat("wipe it").await.unwrap();
        assert!(outcome.is_round_limited());

        let roles: Vec<Role> = chat.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(chat.history()[1].tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_history() {
        let backend = Arc::new(EchoBackend::new(false));
        let mut chat = session(Arc::clone(&backend), true);

        chat.greet().await.unwrap();
        assert!(!chat.history().is_empty());
        chat.reset_history();
        assert!(chat.history().is_empty());

        chat.chat("hello").await.unwrap();
        assert_eq!(backend.seen.lock().last().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_select_model_uses_installed() {
        let backend = Arc::new(EchoBackend::new(false));
        let mut chat = session(backend, true);
        assert_eq!(chat.select_model().await.as_deref(), Some("modelB"));
        assert_eq!(chat.current_model(), Some("modelB"));
    }

    #[test]
    fn test_tool_names_follow_tier() {
        let chat = session(Arc::new(EchoBackend::new(false)), true);
        assert_eq!(chat.tool_names().len(), 12);
    }
}
