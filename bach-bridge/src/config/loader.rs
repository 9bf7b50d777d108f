//! Configuration loader

use std::path::Path;

use bach_utils::{config_file, BachError, Result};

use super::BridgeConfig;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<BridgeConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(BridgeConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<BridgeConfig> {
        if !path.exists() {
            return Err(BachError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| BachError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<BridgeConfig> {
        toml::from_str(content).map_err(|e| BachError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &BridgeConfig) -> Result<()> {
        if config.outbound.port == 0 {
            return Err(BachError::config("outbound.port must be non-zero"));
        }

        let reconnect = &config.reconnect;
        if reconnect.base_delay_ms == 0 {
            return Err(BachError::config("reconnect.base_delay_ms must be at least 1"));
        }
        if reconnect.max_delay_ms < reconnect.base_delay_ms {
            return Err(BachError::config(
                "reconnect.max_delay_ms must not be below reconnect.base_delay_ms",
            ));
        }
        if reconnect.multiplier.is_nan() || reconnect.multiplier < 1.0 {
            return Err(BachError::config("reconnect.multiplier must be at least 1.0"));
        }

        if config.requests.timeout_ms == 0 {
            return Err(BachError::config("requests.timeout_ms must be at least 1"));
        }

        if config.model.max_tool_rounds == 0 {
            return Err(BachError::config("model.max_tool_rounds must be at least 1"));
        }
        if config.model.primary.trim().is_empty() {
            return Err(BachError::config("model.primary must name a model"));
        }

        Ok(())
    }

    /// Load from an explicit path if given, otherwise the default location
    pub fn load_optional(path: Option<&Path>) -> Result<BridgeConfig> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load and validate
    pub fn load_and_validate(path: Option<&Path>) -> Result<BridgeConfig> {
        let config = Self::load_optional(path)?;
        Self::validate(&config)?;
        Ok(config)
    }
}
