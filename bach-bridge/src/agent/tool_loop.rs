//! Multi-round tool-calling loop
//!
//! Each round sends the whole transcript plus the advertised tool schemas
//! to the chat backend. Plain text ends the loop; tool calls are executed
//! one at a time, in the order the model returned them, and their results
//! are appended before the next round.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::ModelSelector;
use crate::config::{ModelConfig, ToolTier};
use crate::error::{BridgeError, Result};
use crate::llm::{ChatBackend, ChatMessage, ChatOptions, ChatRequest, ChatResponse, LlmError};
use crate::tools::{ToolExecutionResult, ToolExecutor};

/// Ordered transcript of one conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    turns: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turns(turns: Vec<ChatMessage>) -> Self {
        Self { turns }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.turns.push(message);
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// How a loop run ended, short of a fatal error
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// The model answered with plain text
    Completed { reply: String, rounds: u32 },
    /// The model was still calling tools when the round budget ran out
    RoundLimitExceeded { partial: String, rounds: u32 },
}

impl LoopOutcome {
    /// Text to show the user
    pub fn text(&self) -> &str {
        match self {
            Self::Completed { reply, .. } => reply,
            Self::RoundLimitExceeded { partial, .. } => partial,
        }
    }

    pub fn rounds(&self) -> u32 {
        match self {
            Self::Completed { rounds, .. } | Self::RoundLimitExceeded { rounds, .. } => *rounds,
        }
    }

    pub fn is_round_limited(&self) -> bool {
        matches!(self, Self::RoundLimitExceeded { .. })
    }

    /// Collapse into a `Result`, turning round-limited runs into an error
    pub fn into_result(self) -> Result<String> {
        match self {
            Self::Completed { reply, .. } => Ok(reply),
            Self::RoundLimitExceeded { rounds, .. } => Err(BridgeError::RoundLimitExceeded { rounds }),
        }
    }
}

/// Per-loop knobs taken from [`ModelConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub max_rounds: u32,
    pub temperature: f64,
    pub max_tokens: u32,
    pub tier: ToolTier,
}

impl From<&ModelConfig> for LoopSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_rounds: config.max_tool_rounds,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            tier: config.tool_tier,
        }
    }
}

pub struct ToolLoop {
    backend: Arc<dyn ChatBackend>,
    executor: ToolExecutor,
    models: ModelSelector,
    settings: LoopSettings,
    tools: Vec<Value>,
}

impl ToolLoop {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        executor: ToolExecutor,
        models: ModelSelector,
        settings: LoopSettings,
    ) -> Self {
        let tools = executor.registry().advertised(settings.tier);
        info!(tier = %settings.tier, tools = tools.len(), "Tool set");
        Self {
            backend,
            executor,
            models,
            settings,
            tools,
        }
    }

    pub fn current_model(&self) -> Option<&str> {
        self.models.current()
    }

    pub fn models_mut(&mut self) -> &mut ModelSelector {
        &mut self.models
    }

    pub fn backend_handle(&self) -> Arc<dyn ChatBackend> {
        Arc::clone(&self.backend)
    }

    pub fn tier(&self) -> ToolTier {
        self.settings.tier
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.executor.registry().names(self.settings.tier)
    }

    /// Drive the conversation until the model stops calling tools or the
    /// round budget is spent. New turns are appended to `conversation`.
    pub async fn run(&mut self, conversation: &mut ConversationState) -> Result<LoopOutcome> {
        let mut last_content = String::new();

        for round in 1..=self.settings.max_rounds {
            let response = self.chat_with_fallback(conversation, round).await?;
            let message = response.message;
            last_content = message.content.clone();

            if message.tool_calls.is_empty() {
                debug!(round, chars = last_content.len(), "Final reply");
                conversation.push(ChatMessage::assistant(last_content.clone()));
                return Ok(LoopOutcome::Completed {
                    reply: last_content,
                    rounds: round,
                });
            }

            let calls = message.tool_calls.clone();
            conversation.push(ChatMessage::assistant_with_calls(message.content, message.tool_calls));

            for call in calls {
                let result = self
                    .executor
                    .execute(&call.function.name, &call.function.arguments)
                    .await;
                log_result(round, &result);
                conversation.push(ChatMessage::tool(call.function.name, result.to_content()));
            }
        }

        warn!(rounds = self.settings.max_rounds, "Max tool rounds reached");
        Ok(LoopOutcome::RoundLimitExceeded {
            partial: last_content,
            rounds: self.settings.max_rounds,
        })
    }

    /// One backend call. A missing model moves on to the next candidate
    /// within the same round; anything else is fatal.
    async fn chat_with_fallback(
        &mut self,
        conversation: &ConversationState,
        round: u32,
    ) -> Result<ChatResponse> {
        let mut tried = Vec::new();

        loop {
            let Some(model) = self.models.current().map(str::to_string) else {
                return Err(BridgeError::ModelUnavailable { tried });
            };
            info!(round, model = %model, "Chat round");

            let request = ChatRequest {
                model: model.clone(),
                messages: conversation.turns().to_vec(),
                tools: self.tools.clone(),
                stream: false,
                options: ChatOptions {
                    temperature: self.settings.temperature,
                    num_predict: self.settings.max_tokens,
                },
            };

            match self.backend.chat(&request).await {
                Ok(response) => return Ok(response),
                Err(LlmError::ModelNotFound { .. }) => {
                    tried.push(model.clone());
                    match self.models.advance() {
                        Some(next) => warn!(missing = %model, fallback = %next, "Model not installed, falling back"),
                        None => return Err(BridgeError::ModelUnavailable { tried }),
                    }
                }
                Err(e) => return Err(BridgeError::Backend(e)),
            }
        }
    }
}

fn log_result(round: u32, result: &ToolExecutionResult) {
    if result.success {
        debug!(round, tool = %result.tool, sent = result.sent.len(), "Tool call succeeded");
    } else {
        warn!(
            round,
            tool = %result.tool,
            error = result.error.as_deref().unwrap_or(""),
            "Tool call failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use bach_protocol::InboundEvent;

    use crate::correlator::ReplyMatch;
    use crate::llm::{Role, ToolCall};
    use crate::tools::{HostChannel, ToolRegistry};

    /// Chat backend that replays scripted responses and records requests
    #[derive(Default)]
    struct ScriptedBackend {
        script: Mutex<VecDeque<std::result::Result<ChatResponse, LlmError>>>,
        missing: Vec<String>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<std::result::Result<ChatResponse, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn models_requested(&self) -> Vec<String> {
            self.requests.lock().iter().map(|r| r.model.clone()).collect()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, request: &ChatRequest) -> std::result::Result<ChatResponse, LlmError> {
            self.requests.lock().push(request.clone());
            if self.missing.contains(&request.model) {
                return Err(LlmError::ModelNotFound {
                    model: request.model.clone(),
                });
            }
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(text("done")))
        }

        async fn list_models(&self) -> std::result::Result<Vec<String>, LlmError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HostChannel for RecordingHost {
        async fn send_command(&self, command: &str) -> Result<()> {
            self.sent.lock().push(command.to_string());
            Ok(())
        }

        async fn send_and_wait(
            &self,
            command: &str,
            _timeout: Duration,
            _matcher: ReplyMatch,
        ) -> Result<InboundEvent> {
            self.sent.lock().push(command.to_string());
            InboundEvent::parse("2", None).ok_or(BridgeError::TransportLost)
        }

        fn default_timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    fn text(content: &str) -> ChatResponse {
        ChatResponse {
            model: String::new(),
            message: ChatMessage::assistant(content),
            done: true,
        }
    }

    fn calls(calls: Vec<(&str, Value)>) -> ChatResponse {
        let tool_calls = calls
            .into_iter()
            .map(|(name, args)| ToolCall::new(name, args))
            .collect();
        ChatResponse {
            model: String::new(),
            message: ChatMessage::assistant_with_calls("", tool_calls),
            done: true,
        }
    }

    fn settings(max_rounds: u32) -> LoopSettings {
        LoopSettings {
            max_rounds,
            temperature: 0.35,
            max_tokens: 256,
            tier: ToolTier::Core,
        }
    }

    fn build(
        backend: Arc<ScriptedBackend>,
        host: Arc<RecordingHost>,
        models: &[&str],
        max_rounds: u32,
    ) -> ToolLoop {
        let executor = ToolExecutor::new(Arc::new(ToolRegistry::new()), host);
        let models = ModelSelector::new(models.iter().map(|m| m.to_string()).collect());
        ToolLoop::new(backend, executor, models, settings(max_rounds))
    }

    fn conversation() -> ConversationState {
        ConversationState::with_turns(vec![
            ChatMessage::system("compose"),
            ChatMessage::user("write two voices"),
        ])
    }

    #[tokio::test]
    async fn test_plain_reply_completes_in_one_round() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(text("Hello."))]));
        let host = Arc::new(RecordingHost::default());
        let mut tool_loop = build(Arc::clone(&backend), host, &["modelA"], 10);

        let mut convo = conversation();
        let outcome = tool_loop.run(&mut convo).await.unwrap();

        assert_eq!(
            outcome,
            LoopOutcome::Completed {
                reply: "Hello.".into(),
                rounds: 1
            }
        );
        assert_eq!(convo.turns().last().unwrap().role, Role::Assistant);
        assert!(!backend.requests.lock()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_two_tool_calls_run_in_order_before_next_round() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(calls(vec![
                ("numvoices", json!({"count": 2})),
                ("clefs", json!({"clefs_list": "G F"})),
            ])),
            Ok(text("Two voices ready.")),
        ]));
        let host = Arc::new(RecordingHost::default());
        let mut tool_loop = build(Arc::clone(&backend), Arc::clone(&host), &["modelA"], 10);

        let mut convo = conversation();
        let outcome = tool_loop.run(&mut convo).await.unwrap();
        assert_eq!(outcome.rounds(), 2);

        assert_eq!(*host.sent.lock(), vec!["numvoices 2", "clefs G F"]);

        // Round two saw both tool results, in call order
        let requests = backend.requests.lock();
        let second = &requests[1];
        let tool_turns: Vec<&str> = second
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_name.as_deref())
            .collect();
        assert_eq!(tool_turns, vec!["numvoices", "clefs"]);
        let assistant = &second.messages[2];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_model_falls_back_within_round() {
        let backend = Arc::new(ScriptedBackend {
            missing: vec!["modelA".into()],
            ..ScriptedBackend::new(vec![
                Ok(calls(vec![("clear", json!({}))])),
                Ok(text("Cleared.")),
            ])
        });
        let host = Arc::new(RecordingHost::default());
        let mut tool_loop = build(Arc::clone(&backend), host, &["modelA", "modelB"], 10);

        let outcome = tool_loop.run(&mut conversation()).await.unwrap();

        // The fallback did not cost a round
        assert_eq!(
            outcome,
            LoopOutcome::Completed {
                reply: "Cleared.".into(),
                rounds: 2
            }
        );
        assert_eq!(
            backend.models_requested(),
            vec!["modelA", "modelB", "modelB"]
        );
        assert_eq!(tool_loop.current_model(), Some("modelB"));
    }

    #[tokio::test]
    async fn test_exhausted_fallbacks_are_fatal() {
        let backend = Arc::new(ScriptedBackend {
            missing: vec!["modelA".into(), "modelB".into()],
            ..Default::default()
        });
        let host = Arc::new(RecordingHost::default());
        let mut tool_loop = build(Arc::clone(&backend), host, &["modelA", "modelB"], 10);

        match tool_loop.run(&mut conversation()).await {
            Err(BridgeError::ModelUnavailable { tried }) => {
                assert_eq!(tried, vec!["modelA", "modelB"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(backend.models_requested().len(), 2);
    }

    #[tokio::test]
    async fn test_other_backend_errors_do_not_fall_back() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(LlmError::Api {
            status: 500,
            message: "boom".into(),
        })]));
        let host = Arc::new(RecordingHost::default());
        let mut tool_loop = build(Arc::clone(&backend), host, &["modelA", "modelB"], 10);

        let err = tool_loop.run(&mut conversation()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Backend(LlmError::Api { status: 500, .. })));
        assert_eq!(backend.models_requested(), vec!["modelA"]);
    }

    #[tokio::test]
    async fn test_round_limit_stops_tool_loop() {
        let script = (0..5)
            .map(|_| Ok(calls(vec![("getnumvoices", json!({}))])))
            .collect();
        let backend = Arc::new(ScriptedBackend::new(script));
        let host = Arc::new(RecordingHost::default());
        let mut tool_loop = build(Arc::clone(&backend), Arc::clone(&host), &["modelA"], 3);

        let outcome = tool_loop.run(&mut conversation()).await.unwrap();

        assert!(outcome.is_round_limited());
        assert_eq!(outcome.rounds(), 3);
        assert_eq!(backend.requests.lock().len(), 3);
        assert_eq!(host.sent.lock().len(), 3);
        assert!(matches!(
            outcome.into_result(),
            Err(BridgeError::RoundLimitExceeded { rounds: 3 })
        ));
    }

    #[tokio::test]
    async fn test_invalid_tool_call_becomes_tool_turn() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(calls(vec![("numvoices", json!({}))])),
            Ok(text("Sorry.")),
        ]));
        let host = Arc::new(RecordingHost::default());
        let mut tool_loop = build(Arc::clone(&backend), Arc::clone(&host), &["modelA"], 10);

        let mut convo = conversation();
        tool_loop.run(&mut convo).await.unwrap();

        assert!(host.sent.lock().is_empty());
        let tool_turn = convo.turns().iter().find(|m| m.role == Role::Tool).unwrap();
        let content: Value = serde_json::from_str(&tool_turn.content).unwrap();
        assert_eq!(content["success"], false);
    }
}
