//! bach-bridge binary: interactive chat, one-shot commands, tool listing

mod cli;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use bach_bridge::agent::{load_system_prompt, ChatSession, LoopSettings, ModelSelector, ToolLoop};
use bach_bridge::config::{ConfigLoader, DEFAULT_CONFIG_TOML};
use bach_bridge::llm::{ChatBackend, OllamaClient};
use bach_bridge::tools::{HostChannel, ToolExecutor, ToolRegistry};
use bach_bridge::{BridgeConfig, BridgeError, BridgeSession, ReplyMatch, Result, SessionEvent};

use cli::{Cli, Command};

/// How long to wait for the host before going on without it
const CONNECT_WAIT: Duration = Duration::from_secs(5);

/// Sent to the host once the model has introduced itself
const READY_PREFIX: &str = "bach_ready";
/// Sent to the host when the REPL exits
const OFFLINE_COMMAND: &str = "bach_offline";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = bach_utils::init_logging_with_config(cli.log_config()) {
        eprintln!("bach-bridge: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bach-bridge failed");
            eprintln!("bach-bridge: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let command = cli.command();
    if command == Command::Config {
        print!("{DEFAULT_CONFIG_TOML}");
        return Ok(());
    }

    let mut config = ConfigLoader::load_optional(cli.config.as_deref())?;
    cli.apply(&mut config)?;
    ConfigLoader::validate(&config)?;

    match command {
        Command::Tools => {
            let registry = ToolRegistry::new();
            for spec in registry.visible(config.model.tool_tier) {
                println!("{:<28} {}", spec.name(), spec.description);
            }
            Ok(())
        }
        Command::Send { command, wait } => run_send(config, &command.join(" "), wait).await,
        Command::Chat | Command::Config => run_chat(config).await,
    }
}

async fn run_send(config: BridgeConfig, command: &str, wait: Option<f64>) -> Result<()> {
    let session = BridgeSession::start(Arc::new(config));
    if !session.wait_outbound_connected(CONNECT_WAIT).await {
        session.shutdown().await;
        return Err(BridgeError::TransportFailed);
    }

    let result = match wait {
        Some(secs) if secs > 0.0 && secs.is_finite() => {
            session.wait_inbound_bound(CONNECT_WAIT).await;
            session
                .send_and_wait(command, Duration::from_secs_f64(secs), ReplyMatch::Next)
                .await
                .map(|reply| println!("{}", reply.data))
        }
        _ => session.send_command(command).await,
    };

    session.shutdown().await;
    result
}

async fn run_chat(config: BridgeConfig) -> Result<()> {
    let config = Arc::new(config);
    let session = Arc::new(BridgeSession::start(Arc::clone(&config)));

    let backend: Arc<dyn ChatBackend> = Arc::new(OllamaClient::new(
        &config.model.base_url,
        config.model.request_timeout(),
    )?);
    let prompt = load_system_prompt(config.model.system_prompt_file.as_deref())?;

    let host: Arc<dyn HostChannel> = session.clone();
    let executor = ToolExecutor::new(Arc::new(ToolRegistry::new()), host);
    let tool_loop = ToolLoop::new(
        backend,
        executor,
        ModelSelector::new(config.model.candidates()),
        LoopSettings::from(&config.model),
    );
    let mut chat = ChatSession::new(tool_loop, prompt, config.model.stateful);
    chat.select_model().await;

    if !session.wait_outbound_connected(CONNECT_WAIT).await {
        warn!(outbound = %config.outbound.addr(), "Host not reachable yet, will keep retrying");
    }
    let observer = tokio::spawn(log_session_events(session.subscribe()));

    println!(
        "\nBach: {}  [{} tools]",
        chat.current_model().unwrap_or("no model"),
        config.model.tool_tier
    );

    match chat.greet().await {
        Ok(outcome) => {
            let greeting = one_line(outcome.text());
            println!("\nBach: {greeting}\n");
            if let Err(e) = session.send_command(&format!("{READY_PREFIX} {greeting}")).await {
                warn!(error = %e, "Could not announce readiness to the host");
            }
        }
        Err(e) => println!("[Error] {e}"),
    }

    println!("Type a message and press Enter. /reset, /tools, /status. Ctrl-C to quit.\n");
    repl(&mut chat, &session).await?;

    if let Err(e) = session.send_command(OFFLINE_COMMAND).await {
        warn!(error = %e, "Could not announce shutdown to the host");
    }
    session.shutdown().await;
    observer.abort();
    info!("bach-bridge stopped");
    Ok(())
}

async fn repl(chat: &mut ChatSession, session: &BridgeSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\nBye.");
            return Ok(());
        };

        match line.trim() {
            "" => continue,
            "/reset" => {
                chat.reset_history();
                println!("History cleared.\n");
            }
            "/tools" => println!("{}\n", chat.tool_names().join(", ")),
            "/status" => println!("{}\n", session.status()),
            text => {
                let turn = tokio::select! {
                    turn = chat.chat(text) => turn,
                    _ = tokio::signal::ctrl_c() => {
                        println!("\nBye.");
                        return Ok(());
                    }
                };
                match turn {
                    Ok(outcome) if outcome.is_round_limited() => {
                        println!("\nBach: {}\n[stopped after {} tool rounds]\n", outcome.text(), outcome.rounds());
                    }
                    Ok(outcome) => println!("\nBach: {}\n", outcome.text()),
                    Err(e) => println!("[Error] {e}"),
                }
            }
        }
    }
}

async fn log_session_events(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(SessionEvent::Unsolicited(event)) => {
                info!(kind = %event.kind, data = %event.data, "Host message");
            }
            Ok(SessionEvent::ConnectionChanged { role, state }) => {
                info!(role = %role, state = %state, "Connection changed");
            }
            Ok(SessionEvent::ClientConnected { id, peer }) => {
                info!(client = %id, peer = %peer, "Host client connected");
            }
            Ok(SessionEvent::ClientDisconnected { id }) => {
                info!(client = %id, "Host client disconnected");
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Session observer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Host commands are single lines
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
