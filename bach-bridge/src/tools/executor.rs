//! Tool execution: validate, render, send
//!
//! Local failures (unknown tool, bad arguments) come back as a failed
//! [`ToolExecutionResult`] without touching the wire. Transport failures
//! also come back as a result so the conversation can carry on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use bach_protocol::InboundEvent;

use super::args::validate;
use super::catalog::{ReplyPolicy, ToolSpec};
use super::registry::ToolRegistry;
use crate::correlator::ReplyMatch;
use crate::error::{BridgeError, Result};

/// Argument carrying a per-call reply timeout
pub const TIMEOUT_ARG: &str = "timeout_seconds";

/// Longest reply wait a call may ask for
pub const MAX_REPLY_TIMEOUT: Duration = Duration::from_secs(3600);

/// The host side as the executor sees it
#[async_trait]
pub trait HostChannel: Send + Sync {
    /// Fire-and-forget
    async fn send_command(&self, command: &str) -> Result<()>;

    async fn send_and_wait(
        &self,
        command: &str,
        timeout: Duration,
        matcher: ReplyMatch,
    ) -> Result<InboundEvent>;

    /// Timeout for awaiting tools that give none of their own
    fn default_timeout(&self) -> Duration;
}

/// Outcome of one tool call, appended to the conversation as a tool turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolExecutionResult {
    pub tool: String,
    /// Wire lines actually sent, in order
    pub sent: Vec<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolExecutionResult {
    fn ok(tool: &str, sent: Vec<String>, payload: Option<Value>) -> Self {
        Self {
            tool: tool.to_string(),
            sent,
            success: true,
            payload,
            error: None,
        }
    }

    fn failed(tool: &str, sent: Vec<String>, error: &BridgeError) -> Self {
        Self {
            tool: tool.to_string(),
            sent,
            success: false,
            payload: None,
            error: Some(error.to_string()),
        }
    }

    /// Text of the tool-result turn
    pub fn to_content(&self) -> String {
        let mut body = json!({ "success": self.success });
        if let Some(payload) = &self.payload {
            body["payload"] = payload.clone();
        }
        if let Some(error) = &self.error {
            body["error"] = Value::String(error.clone());
        }
        if !self.sent.is_empty() {
            body["sent"] = json!(self.sent);
        }
        body.to_string()
    }
}

/// Runs tool calls against a [`HostChannel`]
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    host: Arc<dyn HostChannel>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, host: Arc<dyn HostChannel>) -> Self {
        Self { registry, host }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Validate and render without sending anything
    pub fn prepare(&self, name: &str, arguments: &Value) -> Result<Vec<String>> {
        self.plan(name, arguments).map(|(_, lines, _)| lines)
    }

    /// Run one tool call to completion
    pub async fn execute(&self, name: &str, arguments: &Value) -> ToolExecutionResult {
        let (spec, lines, timeout) = match self.plan(name, arguments) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool call rejected locally");
                return ToolExecutionResult::failed(name, Vec::new(), &e);
            }
        };

        info!(tool = %spec.name(), "Executing tool");
        let mut sent = Vec::with_capacity(lines.len());
        let last = lines.len().saturating_sub(1);

        for (i, line) in lines.into_iter().enumerate() {
            let awaited = match timeout {
                Some(timeout) if i == last => Some(timeout),
                _ => None,
            };

            match awaited {
                None => {
                    if let Err(e) = self.host.send_command(&line).await {
                        warn!(tool = %spec.name(), error = %e, "Send failed");
                        return ToolExecutionResult::failed(spec.name(), sent, &e);
                    }
                    sent.push(line);
                }
                Some(timeout) => {
                    let reply = self
                        .host
                        .send_and_wait(&line, timeout, ReplyMatch::Next)
                        .await;
                    // The line went out unless the link was down at send time
                    let went_out = !matches!(
                        reply,
                        Err(BridgeError::TransportFailed) | Err(BridgeError::Busy)
                    );
                    if went_out {
                        sent.push(line);
                    }
                    return match reply {
                        Ok(event) => {
                            debug!(tool = %spec.name(), kind = %event.kind, "Tool reply received");
                            let payload = serde_json::to_value(&event).ok();
                            ToolExecutionResult::ok(spec.name(), sent, payload)
                        }
                        Err(e) => {
                            warn!(tool = %spec.name(), error = %e, "Awaited tool failed");
                            ToolExecutionResult::failed(spec.name(), sent, &e)
                        }
                    };
                }
            }
        }

        ToolExecutionResult::ok(spec.name(), sent, None)
    }

    fn plan(
        &self,
        name: &str,
        arguments: &Value,
    ) -> Result<(&'static ToolSpec, Vec<String>, Option<Duration>)> {
        let spec = self.registry.resolve(name)?;
        let raw = decode_arguments(spec.name(), arguments)?;
        let args = validate(spec.params, &raw)
            .map_err(|message| BridgeError::invalid_arguments(spec.name(), message))?;
        let lines = spec
            .template
            .render(&args)
            .map_err(|message| BridgeError::invalid_arguments(spec.name(), message))?;

        let timeout = match spec.reply {
            ReplyPolicy::FireAndForget => None,
            ReplyPolicy::Await { timeout_secs } => Some(
                call_timeout(spec.name(), args.number(TIMEOUT_ARG))?
                    .or_else(|| timeout_secs.map(Duration::from_secs))
                    .unwrap_or_else(|| self.host.default_timeout()),
            ),
        };
        debug!(tool = %spec.name(), ?timeout, lines = lines.len(), "Rendered tool call");

        Ok((spec, lines, timeout))
    }
}

/// Per-call reply timeout. Non-positive values fall back to the defaults.
fn call_timeout(tool: &str, secs: Option<f64>) -> Result<Option<Duration>> {
    let Some(secs) = secs.filter(|secs| *secs > 0.0) else {
        return Ok(None);
    };
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if timeout <= MAX_REPLY_TIMEOUT => Ok(Some(timeout)),
        _ => Err(BridgeError::invalid_arguments(
            tool,
            format!(
                "{TIMEOUT_ARG} must be at most {} seconds",
                MAX_REPLY_TIMEOUT.as_secs()
            ),
        )),
    }
}

/// Arguments may arrive as an object, a JSON-encoded string or nothing
fn decode_arguments(tool: &str, arguments: &Value) -> Result<Map<String, Value>> {
    match arguments {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(text) if text.trim().is_empty() => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(BridgeError::invalid_arguments(tool, "arguments must be an object")),
            Err(e) => Err(BridgeError::invalid_arguments(
                tool,
                format!("arguments are not valid JSON: {e}"),
            )),
        },
        _ => Err(BridgeError::invalid_arguments(tool, "arguments must be an object")),
    }
}
