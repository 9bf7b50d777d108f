//! Configuration management for the bridge
//!
//! TOML file under the XDG config directory, overridden by CLI flags, then
//! frozen into an `Arc<BridgeConfig>` for the session.

mod defaults;
mod loader;
mod schema;

pub use defaults::DEFAULT_CONFIG_TOML;
pub use loader::ConfigLoader;
pub use schema::*;

use std::sync::Arc;

use bach_utils::{BachError, Result};

/// Shared, read-only configuration handle
pub type ConfigHandle = Arc<BridgeConfig>;

/// Parse a `host:port` endpoint as given on the command line
pub fn parse_endpoint(value: &str) -> Result<(String, u16)> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| BachError::config(format!("endpoint '{}' must be host:port", value)))?;

    if host.is_empty() {
        return Err(BachError::config(format!("endpoint '{}' has no host", value)));
    }

    let port = port
        .parse::<u16>()
        .map_err(|e| BachError::config(format!("endpoint '{}' has an invalid port: {}", value, e)))?;

    Ok((host.trim_matches(|c| c == '[' || c == ']').to_string(), port))
}
