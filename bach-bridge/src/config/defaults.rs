//! Default configuration values
//!
//! Printed by `bach-bridge config` as a starting point for a config file.

/// Default configuration as TOML
pub const DEFAULT_CONFIG_TOML: &str = r##"
# bach-bridge configuration

[outbound]
# Host application listening for commands
host = "127.0.0.1"
port = 3000

[inbound]
# Bridge listens here for replies and events from the host
host = "0.0.0.0"
port = 3001
# Close older host connections when a new one arrives
close_superseded = false

[reconnect]
base_delay_ms = 250
max_delay_ms = 10000
multiplier = 2.0

[requests]
# Reply timeout for query tools that do not pass timeout_seconds
timeout_ms = 15000

[model]
base_url = "http://localhost:11434"
primary = "qwen2.5:14b-instruct"
fallbacks = ["qwen2.5:14b", "qwen2.5:7b-instruct", "qwen2.5:7b"]
temperature = 0.35
max_tokens = 2048
request_timeout_secs = 300
max_tool_rounds = 10
stateful = true
# "core" (about a dozen tools) or "extended" (full catalog)
tool_tier = "core"
# system_prompt_file = "/path/to/prompt.md"
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeConfig, ConfigLoader};
    use std::path::Path;

    #[test]
    fn test_default_toml_matches_default_struct() {
        let parsed = ConfigLoader::parse(DEFAULT_CONFIG_TOML, Path::new("default.toml")).unwrap();
        assert_eq!(parsed, BridgeConfig::default());
    }
}
