//! Configuration schema structs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration, immutable for the lifetime of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub outbound: OutboundConfig,
    pub inbound: InboundConfig,
    pub reconnect: ReconnectConfig,
    pub requests: RequestConfig,
    pub model: ModelConfig,
}

/// Where the host listens for commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    pub host: String,
    pub port: u16,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl OutboundConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where the bridge listens for host replies and events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    pub host: String,
    /// 0 binds an ephemeral port
    pub port: u16,
    /// Close older host connections when a newer one is accepted
    pub close_superseded: bool,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            close_superseded: false,
        }
    }
}

impl InboundConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Exponential backoff between reconnect attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Request/reply settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Reply timeout used when a tool call does not give its own
    pub timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 15_000 }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Which slice of the tool catalog the model sees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolTier {
    /// Everyday composition tools
    #[default]
    Core,
    /// Core plus slots, markers, export, voice management and the rest
    Extended,
}

impl std::fmt::Display for ToolTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => f.write_str("core"),
            Self::Extended => f.write_str("extended"),
        }
    }
}

/// Chat model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the Ollama-compatible server
    pub base_url: String,
    pub primary: String,
    /// Tried in order when the current model is not installed
    pub fallbacks: Vec<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub max_tool_rounds: u32,
    /// Keep history across messages
    pub stateful: bool,
    pub tool_tier: ToolTier,
    /// Replaces the built-in system prompt
    pub system_prompt_file: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            primary: "qwen2.5:14b-instruct".into(),
            fallbacks: vec![
                "qwen2.5:14b".into(),
                "qwen2.5:7b-instruct".into(),
                "qwen2.5:7b".into(),
            ],
            temperature: 0.35,
            max_tokens: 2048,
            request_timeout_secs: 300,
            max_tool_rounds: 10,
            stateful: true,
            tool_tier: ToolTier::Core,
            system_prompt_file: None,
        }
    }
}

impl ModelConfig {
    /// Primary then fallbacks, de-duplicated with order kept
    pub fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in std::iter::once(&self.primary).chain(self.fallbacks.iter()) {
            let name = name.trim();
            if !name.is_empty() && !out.iter().any(|c| c == name) {
                out.push(name.to_string());
            }
        }
        out
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.outbound.addr(), "127.0.0.1:3000");
        assert_eq!(config.inbound.addr(), "0.0.0.0:3001");
        assert!(!config.inbound.close_superseded);
        assert_eq!(config.reconnect.base_delay(), Duration::from_millis(250));
        assert_eq!(config.requests.timeout(), Duration::from_secs(15));
        assert_eq!(config.model.max_tool_rounds, 10);
        assert_eq!(config.model.tool_tier, ToolTier::Core);
    }

    #[test]
    fn test_candidates_dedup_keeps_order() {
        let model = ModelConfig {
            primary: "modelA".into(),
            fallbacks: vec!["modelB".into(), "modelA".into(), " ".into(), "modelC".into()],
            ..Default::default()
        };
        assert_eq!(model.candidates(), vec!["modelA", "modelB", "modelC"]);
    }

    #[test]
    fn test_tool_tier_serde() {
        let tier: ToolTier = serde_json::from_str("\"extended\"").unwrap();
        assert_eq!(tier, ToolTier::Extended);
        assert_eq!(ToolTier::Core.to_string(), "core");
    }
}
