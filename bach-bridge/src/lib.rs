//! bach-bridge: connects a tool-calling chat model to a line-oriented
//! notation host over two TCP links
//!
//! - [`transport`]: self-healing outbound client and inbound listener
//! - [`correlator`]: single-slot request/reply matching and event routing
//! - [`session`]: [`BridgeSession`] owning both links and the request slot
//! - [`tools`]: static tool catalog, argument validation, execution
//! - [`llm`]: Ollama-compatible chat backend
//! - [`agent`]: the tool-calling loop and chat session

pub mod agent;
pub mod config;
pub mod correlator;
pub mod error;
pub mod llm;
pub mod session;
pub mod tools;
pub mod transport;

pub use config::{BridgeConfig, ConfigHandle, ConfigLoader, ToolTier};
pub use correlator::{Correlator, ReplyMatch, RequestSlot, SessionEvent};
pub use error::{BridgeError, Result};
pub use session::{BridgeSession, SessionStatus};
