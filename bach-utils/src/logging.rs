//! Logging infrastructure for the bach bridge
//!
//! Provides unified logging setup using the tracing ecosystem. Output goes
//! to stderr and/or a log file, never stdout, since the REPL owns stdout.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{paths, BachError, Result};

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr
    Stderr,
    /// Log to file
    File,
    /// Log to both stderr and file
    Both,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g., "info", "debug", "bach_bridge=debug,reqwest=warn")
    pub filter: String,
    /// Include span events (enter/exit)
    pub span_events: bool,
    /// Include file/line in logs
    pub file_line: bool,
    /// Optional custom log file name (defaults to "bach-bridge.log")
    pub file_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            span_events: false,
            file_line: false,
            file_name: None,
        }
    }
}

impl LogConfig {
    /// Create config for the interactive bridge (stderr, `BACH_LOG` filter)
    pub fn bridge() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: std::env::var("BACH_LOG").unwrap_or_else(|_| "info".into()),
            span_events: false,
            file_line: false,
            file_name: None,
        }
    }

    /// Create config for development (verbose stderr)
    pub fn development() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "debug".into(),
            span_events: true,
            file_line: true,
            file_name: None,
        }
    }

    /// Redirect output to the given log file name inside the log directory
    pub fn with_file(mut self, file_name: impl Into<String>, keep_stderr: bool) -> Self {
        self.output = if keep_stderr {
            LogOutput::Both
        } else {
            LogOutput::File
        };
        self.file_name = Some(file_name.into());
        self
    }

    /// Path of the log file this config would write to
    pub fn log_path(&self) -> PathBuf {
        paths::log_dir().join(self.file_name.as_deref().unwrap_or("bach-bridge.log"))
    }
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| BachError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let fmt_layer = if config.span_events {
        fmt_layer.with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    } else {
        fmt_layer
    };

    let fmt_layer = if config.file_line {
        fmt_layer.with_file(true).with_line_number(true)
    } else {
        fmt_layer.with_file(false).with_line_number(false)
    };

    match config.output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| BachError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::File => {
            let file = open_log_file(&config)?;

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(Mutex::new(file)).with_ansi(false))
                .try_init()
                .map_err(|e| BachError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::Both => {
            let file = open_log_file(&config)?;

            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .with(file_layer)
                .try_init()
                .map_err(|e| BachError::internal(format!("Failed to init logging: {}", e)))?;
        }
    }

    Ok(())
}

fn open_log_file(config: &LogConfig) -> Result<std::fs::File> {
    let log_dir = paths::log_dir();
    paths::ensure_dir(&log_dir).map_err(|e| BachError::FileWrite {
        path: log_dir.clone(),
        source: e,
    })?;

    let log_path = config.log_path();
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| BachError::FileWrite {
            path: log_path,
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "info");
        assert!(!config.span_events);
        assert!(!config.file_line);
    }

    #[test]
    fn test_log_config_bridge_env() {
        let original = env::var("BACH_LOG").ok();

        env::set_var("BACH_LOG", "bach_bridge=trace");
        let config = LogConfig::bridge();
        assert_eq!(config.filter, "bach_bridge=trace");
        assert_eq!(config.output, LogOutput::Stderr);

        env::remove_var("BACH_LOG");
        let config = LogConfig::bridge();
        assert_eq!(config.filter, "info");

        if let Some(val) = original {
            env::set_var("BACH_LOG", val);
        }
    }

    #[test]
    fn test_log_config_development() {
        let config = LogConfig::development();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "debug");
        assert!(config.span_events);
        assert!(config.file_line);
    }

    #[test]
    fn test_with_file_switches_output() {
        let config = LogConfig::default().with_file("session.log", false);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.file_name.as_deref(), Some("session.log"));
        assert!(config.log_path().ends_with("session.log"));

        let both = LogConfig::default().with_file("session.log", true);
        assert_eq!(both.output, LogOutput::Both);
    }

    #[test]
    fn test_default_log_path() {
        let config = LogConfig::default();
        assert!(config.log_path().ends_with("bach-bridge.log"));
    }

    // init_logging_with_config() is not exercised here: the global subscriber can only
    // be installed once per test process.
}
