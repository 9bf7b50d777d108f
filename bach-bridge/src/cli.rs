//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use bach_bridge::config::{parse_endpoint, BridgeConfig, ToolTier};
use bach_utils::{BachError, LogConfig, Result};

/// Chat with a notation host through a local tool-calling model
#[derive(Parser, Debug)]
#[command(name = "bach-bridge")]
#[command(about = "Bridge a tool-calling chat model to a bach.roll host")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the XDG config location)
    #[arg(long, env = "BACH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Host command endpoint, host:port
    #[arg(long, value_name = "HOST:PORT", global = true)]
    pub outbound: Option<String>,

    /// Local listen address for host replies, host:port
    #[arg(long, value_name = "HOST:PORT", global = true)]
    pub inbound: Option<String>,

    /// Primary model
    #[arg(long, env = "BACH_MODEL", global = true)]
    pub model: Option<String>,

    /// Fallback model, tried in order when the current one is missing
    ///
    /// Repeat for several. Replaces the configured fallback list.
    #[arg(long = "fallback", value_name = "MODEL", global = true)]
    pub fallbacks: Vec<String>,

    /// Advertise the extended tool set
    #[arg(long, global = true)]
    pub extended: bool,

    /// Maximum tool-calling rounds per message
    #[arg(long, global = true)]
    pub max_rounds: Option<u32>,

    /// Base URL of the Ollama server
    #[arg(long, env = "BACH_OLLAMA_URL", global = true)]
    pub ollama_url: Option<String>,

    /// Write logs to this file in the log directory instead of stderr
    #[arg(long, value_name = "NAME", global = true)]
    pub log_file: Option<String>,

    /// With --log-file, keep logging to stderr as well
    #[arg(long, requires = "log_file", global = true)]
    pub log_stderr: bool,

    /// Debug-level logs with span events and source locations
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Interactive chat (default)
    Chat,

    /// Send one raw command to the host
    Send {
        /// Command words, joined with spaces
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,

        /// Wait this many seconds for the reply and print it
        #[arg(long, value_name = "SECS")]
        wait: Option<f64>,
    },

    /// List the tools advertised to the model
    Tools,

    /// Print the default configuration file
    Config,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }

    pub fn log_config(&self) -> LogConfig {
        let base = if self.verbose {
            LogConfig::development()
        } else {
            LogConfig::bridge()
        };
        match &self.log_file {
            Some(name) => base.with_file(name.clone(), self.log_stderr),
            None => base,
        }
    }

    /// Apply flag overrides on top of the loaded file
    pub fn apply(&self, config: &mut BridgeConfig) -> Result<()> {
        if let Some(endpoint) = &self.outbound {
            let (host, port) = parse_endpoint(endpoint)?;
            config.outbound.host = host;
            config.outbound.port = port;
        }
        if let Some(endpoint) = &self.inbound {
            let (host, port) = parse_endpoint(endpoint)?;
            config.inbound.host = host;
            config.inbound.port = port;
        }
        if let Some(model) = &self.model {
            config.model.primary = model.clone();
        }
        if !self.fallbacks.is_empty() {
            config.model.fallbacks = self.fallbacks.clone();
        }
        if self.extended {
            config.model.tool_tier = ToolTier::Extended;
        }
        if let Some(rounds) = self.max_rounds {
            if rounds == 0 {
                return Err(BachError::config("--max-rounds must be at least 1"));
            }
            config.model.max_tool_rounds = rounds;
        }
        if let Some(url) = &self.ollama_url {
            config.model.base_url = url.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bach-bridge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_command_is_chat() {
        assert_eq!(parse(&[]).command(), Command::Chat);
    }

    #[test]
    fn test_send_joins_words() {
        let cli = parse(&["send", "--wait", "2", "getnumvoices", "label"]);
        match cli.command() {
            Command::Send { command, wait } => {
                assert_eq!(command.join(" "), "getnumvoices label");
                assert_eq!(wait, Some(2.0));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_overrides_apply() {
        let cli = parse(&[
            "--outbound",
            "10.0.0.2:4000",
            "--model",
            "modelA",
            "--fallback",
            "modelB",
            "--fallback",
            "modelC",
            "--max-rounds",
            "3",
            "tools",
            "--extended",
        ]);
        let mut config = BridgeConfig::default();
        cli.apply(&mut config).unwrap();

        assert_eq!(config.outbound.addr(), "10.0.0.2:4000");
        assert_eq!(config.model.candidates(), vec!["modelA", "modelB", "modelC"]);
        assert_eq!(config.model.max_tool_rounds, 3);
        assert_eq!(config.model.tool_tier, ToolTier::Extended);
        assert_eq!(cli.command(), Command::Tools);
    }

    #[test]
    fn test_log_flags_select_output() {
        use bach_utils::LogOutput;

        assert_eq!(parse(&[]).log_config().output, LogOutput::Stderr);

        let config = parse(&["--log-file", "bridge.log"]).log_config();
        assert_eq!(config.output, LogOutput::File);

        let config = parse(&["-v", "--log-file", "bridge.log", "--log-stderr"]).log_config();
        assert_eq!(config.output, LogOutput::Both);
        assert_eq!(config.filter, "debug");
        assert!(config.file_line);

        let orphan = Cli::try_parse_from(["bach-bridge", "--log-stderr"]);
        assert!(orphan.is_err());
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let cli = parse(&["--inbound", "nowhere"]);
        assert!(cli.apply(&mut BridgeConfig::default()).is_err());
    }
}
