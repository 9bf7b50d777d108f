//! Inbound message envelope and connection vocabulary

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier assigned to each accepted host connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Which side of the bridge a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    /// Bridge is the client, sends commands to the host
    Outbound,
    /// Bridge is the server, receives replies and events from the host
    Inbound,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound => f.write_str("outbound"),
            Self::Inbound => f.write_str("inbound"),
        }
    }
}

/// Connection state for one direction of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected; a retry is scheduled
    Disconnected,
    /// Connect attempt in progress
    Connecting,
    /// Link is up (inbound: at least one host client registered)
    Connected,
    /// Inbound only: bound and waiting for the host to connect
    Listening,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Listening => "listening",
        };
        f.write_str(s)
    }
}

/// Envelope tag of an inbound line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Score data in llll form
    Llll,
    /// Anything else: status text, query answers, notifications
    Info,
}

impl MessageKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "llll" => Some(Self::Llll),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llll => f.write_str("llll"),
            Self::Info => f.write_str("info"),
        }
    }
}

/// A single line received from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub data: String,
    pub raw: String,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientId>,
}

impl InboundEvent {
    /// Wrap a raw line in its envelope. Returns `None` for blank lines.
    pub fn parse(raw: &str, client: Option<ClientId>) -> Option<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        let mut kind = if looks_like_llll(text) {
            MessageKind::Llll
        } else {
            MessageKind::Info
        };
        let mut data = text.to_string();

        if text.starts_with('{') && text.ends_with('}') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
                let tagged = map
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(MessageKind::from_tag);

                if let Some(tag) = tagged {
                    kind = tag;
                    data = map.get("data").map(value_text).unwrap_or_default();
                } else if let Some(message) = map.get("message") {
                    kind = MessageKind::Info;
                    data = value_text(message);
                }
            }
        }

        Some(Self {
            kind,
            data,
            raw: text.to_string(),
            received_at: Utc::now(),
            client,
        })
    }
}

/// Raw llll, optionally prefixed with the `roll` selector
fn looks_like_llll(text: &str) -> bool {
    if text.starts_with('[') && text.ends_with(']') {
        return true;
    }
    let lower = text.to_ascii_lowercase();
    lower.starts_with("roll [") && text.ends_with(']')
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
